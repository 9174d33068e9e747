//! End-to-end driver tests: snapshot files in, output files out, with a
//! missing snapshot ending the run cleanly.

use std::fs;
use std::path::PathBuf;

use foam::{loader, DVec3, FoamSimulation, SimulationParams, Timestep};

fn work_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("foam-pipeline-{}-{name}", std::process::id()));
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn ascii_snapshot() -> String {
    "# vtk DataFile Version 3.0\n\
     fluid frame\n\
     ASCII\n\
     DATASET POLYDATA\n\
     POINTS 2 float\n\
     0.50 0.50 0.50\n\
     0.55 0.50 0.50\n\
     POINT_DATA 2\n\
     VECTORS Vel float\n\
     0 0 2\n\
     0 0 -2\n\
     SCALARS Rhop float 1\n\
     LOOKUP_TABLE default\n\
     1000 1000\n"
        .to_string()
}

fn pipeline_params(dir: &std::path::Path) -> SimulationParams {
    SimulationParams {
        data_path: dir.join("in").to_string_lossy().into_owned(),
        file_prefix: "f_".into(),
        output_path: dir.join("out").to_string_lossy().into_owned(),
        output_prefix: "foam_".into(),
        exclusion_zone_file: String::new(),
        nstart: 0,
        nend: 9,
        nzeros: 4,
        text_files: true,
        vtk_files: true,
        vtk_diffuse_data: true,
        vtk_fluid_data: true,
        h: 0.1,
        mass: 0.008,
        domain_min: [0.0, 0.0, 0.0],
        domain_max: [1.0, 1.0, 1.0],
        min_ta: 0.1,
        max_ta: 1.0,
        min_wc: 2.0,
        max_wc: 8.0,
        min_k: 0.001,
        max_k: 0.01,
        k_ta: 100.0,
        k_wc: 0.0,
        spray: 2.0,
        bubbles: 10.0,
        lifetime: 3,
        k_b: 0.5,
        k_d: 0.7,
        timesteps: vec![Timestep {
            nstep: 0,
            tout: 0.01,
        }],
        seed: Some(7),
    }
}

#[test]
fn test_run_processes_existing_frames_and_stops_at_gap() {
    let dir = work_dir("gap");
    fs::create_dir_all(dir.join("in")).unwrap();
    fs::create_dir_all(dir.join("out")).unwrap();
    // Frames 0 and 1 exist; frame 2 is missing and ends the run.
    fs::write(dir.join("in/f_0000.vtk"), ascii_snapshot()).unwrap();
    fs::write(dir.join("in/f_0001.vtk"), ascii_snapshot()).unwrap();

    let params = pipeline_params(&dir);
    let mut sim = FoamSimulation::new(params).unwrap();
    sim.run().unwrap();

    for frame in ["0000", "0001"] {
        for suffix in [".txt", ".vtk", "_diffuse.vtk", "_fluid.vtk"] {
            let path = dir.join(format!("out/foam_{frame}{suffix}"));
            assert!(path.exists(), "missing output {path:?}");
        }
    }
    assert!(!dir.join("out/foam_0002.txt").exists());

    // The diffuse output is a binary legacy-VTK polydata file.
    let bytes = fs::read(dir.join("out/foam_0001_diffuse.vtk")).unwrap();
    let head = String::from_utf8_lossy(&bytes[..120.min(bytes.len())]).to_string();
    assert!(head.starts_with("# vtk DataFile Version 3.0"));
    assert!(head.contains("BINARY"));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_text_output_lists_persistent_particles() {
    let dir = work_dir("text");
    fs::create_dir_all(dir.join("in")).unwrap();
    fs::create_dir_all(dir.join("out")).unwrap();
    fs::write(dir.join("in/f_0000.vtk"), ascii_snapshot()).unwrap();

    let params = pipeline_params(&dir);
    let mut sim = FoamSimulation::new(params).unwrap();
    sim.run().unwrap();

    let text = fs::read_to_string(dir.join("out/foam_0000.txt")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), sim.particles().len());
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(fields.len(), 4);
        let code: i32 = fields[3].parse().unwrap();
        assert!((0..=2).contains(&code));
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_invalid_params_rejected_before_first_frame() {
    let dir = work_dir("invalid");
    let mut params = pipeline_params(&dir);
    params.timesteps.clear();
    assert!(FoamSimulation::new(params).is_err());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_missing_output_directory_is_fatal() {
    let dir = work_dir("fatal");
    fs::create_dir_all(dir.join("in")).unwrap();
    // No out/ directory: the first write must fail and abort the run.
    fs::write(dir.join("in/f_0000.vtk"), ascii_snapshot()).unwrap();

    let params = pipeline_params(&dir);
    let mut sim = FoamSimulation::new(params).unwrap();
    assert!(sim.run().is_err());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_exclusion_zone_descriptor_roundtrip() {
    let dir = work_dir("zone");
    let zone_path = dir.join("zone.txt");
    fs::write(&zone_path, "0.25 0.25 0.25  0.75 0.75 0.75\n").unwrap();

    let zone = loader::load_exclusion_zone(&zone_path).unwrap();
    assert_eq!(zone.min, DVec3::splat(0.25));
    assert_eq!(zone.max, DVec3::splat(0.75));

    fs::write(&zone_path, "0.25 0.25 0.25 0.75\n").unwrap();
    assert!(loader::load_exclusion_zone(&zone_path).is_err());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_exclusion_zone_empties_the_frame() {
    let dir = work_dir("excluded");
    fs::create_dir_all(dir.join("in")).unwrap();
    fs::create_dir_all(dir.join("out")).unwrap();
    fs::write(dir.join("in/f_0000.vtk"), ascii_snapshot()).unwrap();
    let zone_path = dir.join("zone.txt");
    // Both fluid particles sit inside the excluded box.
    fs::write(&zone_path, "0.4 0.4 0.4 0.7 0.7 0.7").unwrap();

    let mut params = pipeline_params(&dir);
    params.exclusion_zone_file = zone_path.to_string_lossy().into_owned();
    let mut sim = FoamSimulation::new(params).unwrap();
    sim.run().unwrap();

    // With every particle masked out nothing is seeded.
    assert!(sim.particles().is_empty());
    let text = fs::read_to_string(dir.join("out/foam_0000.txt")).unwrap();
    assert!(text.is_empty());

    fs::remove_dir_all(&dir).ok();
}
