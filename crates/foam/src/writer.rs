//! Point-cloud output: plain text and legacy binary VTK polydata.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use glam::DVec3;

use crate::engine::FrameDiagnostics;
use crate::error::{FoamError, Result};
use crate::particle::{DiffuseParticle, FluidParticle};

/// One line per persistent diffuse particle: `x y z t`, scientific
/// notation, with `t` 0 for spray, 1 for foam, 2 for bubbles.
pub fn write_text(
    path: &Path,
    particles: &[DiffuseParticle],
    spray: f64,
    bubbles: f64,
) -> Result<()> {
    let mut text = String::with_capacity(particles.len() * 48);
    for dp in particles {
        let code = dp.particle_type(spray, bubbles).code();
        let _ = writeln!(
            text,
            "{:.6e} {:.6e} {:.6e} {}",
            dp.position.x, dp.position.y, dp.position.z, code
        );
    }
    save(path, text.as_bytes())
}

/// Positions-only point cloud with a velocity vector attribute.
pub fn write_vtk_positions(path: &Path, particles: &[DiffuseParticle]) -> Result<()> {
    let mut vtk = VtkBuffer::new("diffuse particle positions");
    vtk.points(particles.iter().map(|dp| dp.position), particles.len());
    vtk.vertices(particles.len());
    vtk.line(&format!("POINT_DATA {}", particles.len()));
    vtk.line("VECTORS Velocity double");
    vtk.f64_triples(particles.iter().map(|dp| dp.velocity));
    save(path, &vtk.data)
}

/// Full diffuse point cloud: id as the primary scalars, plus particle
/// type, velocity and density as field arrays.
pub fn write_vtk_diffuse(
    path: &Path,
    particles: &[DiffuseParticle],
    spray: f64,
    bubbles: f64,
) -> Result<()> {
    let n = particles.len();
    let mut vtk = VtkBuffer::new("diffuse particle data");
    vtk.points(particles.iter().map(|dp| dp.position), n);
    vtk.vertices(n);
    vtk.line(&format!("POINT_DATA {n}"));

    vtk.line("SCALARS id int 1");
    vtk.line("LOOKUP_TABLE default");
    vtk.i32s(particles.iter().map(|dp| dp.id as i32));

    vtk.line("FIELD FieldData 3");
    vtk.line(&format!("ParticleType 1 {n} int"));
    vtk.i32s(
        particles
            .iter()
            .map(|dp| dp.particle_type(spray, bubbles).code()),
    );
    vtk.line(&format!("Velocity 3 {n} double"));
    vtk.f64_triples(particles.iter().map(|dp| dp.velocity));
    vtk.line(&format!("Density 1 {n} double"));
    vtk.f64s(particles.iter().map(|dp| dp.density));

    save(path, &vtk.data)
}

/// Fluid diagnostics: every fluid position with the frame's clamped field
/// responses and seed counts.
pub fn write_vtk_fluid(
    path: &Path,
    fluid: &[FluidParticle],
    diag: &FrameDiagnostics,
) -> Result<()> {
    let n = fluid.len();
    let mut vtk = VtkBuffer::new("fluid field responses");
    vtk.points(fluid.iter().map(|p| p.position), n);
    vtk.vertices(n);
    vtk.line(&format!("POINT_DATA {n}"));

    vtk.line("FIELD FieldData 4");
    vtk.line(&format!("TrappedAir 1 {n} double"));
    vtk.f64s(diag.trapped_air.iter().copied());
    vtk.line(&format!("WaveCrests 1 {n} double"));
    vtk.f64s(diag.wave_crests.iter().copied());
    vtk.line(&format!("Energy 1 {n} double"));
    vtk.f64s(diag.energy.iter().copied());
    vtk.line(&format!("DiffuseParticles 1 {n} int"));
    vtk.i32s(diag.ndiffuse.iter().copied());

    save(path, &vtk.data)
}

fn save(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|err| FoamError::Io {
        path: path.to_path_buf(),
        source: err,
    })
}

/// Legacy binary VTK assembly buffer. Numeric payloads are big-endian,
/// as the legacy format requires.
struct VtkBuffer {
    data: Vec<u8>,
}

impl VtkBuffer {
    fn new(title: &str) -> Self {
        let mut buf = Self { data: Vec::new() };
        buf.line("# vtk DataFile Version 3.0");
        buf.line(title);
        buf.line("BINARY");
        buf.line("DATASET POLYDATA");
        buf
    }

    fn line(&mut self, text: &str) {
        self.data.extend_from_slice(text.as_bytes());
        self.data.push(b'\n');
    }

    fn points(&mut self, positions: impl Iterator<Item = DVec3>, count: usize) {
        self.line(&format!("POINTS {count} double"));
        self.f64_triples(positions);
    }

    /// One vertex cell per point, so viewers render the cloud.
    fn vertices(&mut self, count: usize) {
        self.line(&format!("VERTICES {count} {}", count * 2));
        for i in 0..count {
            self.data.extend_from_slice(&1i32.to_be_bytes());
            self.data.extend_from_slice(&(i as i32).to_be_bytes());
        }
        self.data.push(b'\n');
    }

    fn f64s(&mut self, values: impl Iterator<Item = f64>) {
        for v in values {
            self.data.extend_from_slice(&v.to_be_bytes());
        }
        self.data.push(b'\n');
    }

    fn f64_triples(&mut self, values: impl Iterator<Item = DVec3>) {
        for v in values {
            self.data.extend_from_slice(&v.x.to_be_bytes());
            self.data.extend_from_slice(&v.y.to_be_bytes());
            self.data.extend_from_slice(&v.z.to_be_bytes());
        }
        self.data.push(b'\n');
    }

    fn i32s(&mut self, values: impl Iterator<Item = i32>) {
        for v in values {
            self.data.extend_from_slice(&v.to_be_bytes());
        }
        self.data.push(b'\n');
    }
}
