//! Run-wide simulation parameters and the timestep schedule.

use std::path::PathBuf;

use glam::DVec3;
use serde::Deserialize;

use crate::error::{FoamError, Result};
use crate::grid::Aabb;

/// One entry of the timestep schedule: from frame `nstep` onward the
/// physical timestep length is `tout` seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Timestep {
    pub nstep: i32,
    pub tout: f64,
}

/// Advance the schedule cursor for the given frame and return the active
/// timestep length.
///
/// The cursor moves only when `nstep` is strictly past the next entry's
/// start frame, so a new entry takes effect one frame after its `nstep`.
/// This matches the historical behavior of the pipeline and is relied on
/// by downstream tooling.
pub fn current_tout(timesteps: &[Timestep], cursor: &mut usize, nstep: i32) -> f64 {
    if *cursor + 1 < timesteps.len() && nstep > timesteps[*cursor + 1].nstep {
        *cursor += 1;
    }
    timesteps[*cursor].tout
}

/// The full parameter bundle for a run, fixed for its entire duration.
///
/// Deserialized from a JSON file by the front-end; see
/// [`validate`](Self::validate) for the constraints enforced before the
/// first frame is processed.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationParams {
    /// Directory holding the input snapshot sequence.
    pub data_path: String,
    /// Input snapshots are `data_path/file_prefix{N:0>nzeros}.vtk`.
    pub file_prefix: String,
    /// Directory receiving the output files.
    pub output_path: String,
    /// Outputs are `output_path/output_prefix{N:0>nzeros}{suffix}`.
    pub output_prefix: String,
    /// Path to an axis-aligned exclusion-box descriptor; empty disables it.
    #[serde(default)]
    pub exclusion_zone_file: String,

    /// First frame index (inclusive).
    pub nstart: i32,
    /// Last frame index (inclusive).
    pub nend: i32,
    /// Zero-padding width of the frame number in file names.
    pub nzeros: usize,

    /// Emit `{prefix}{N}.txt` with one `x y z type` line per particle.
    pub text_files: bool,
    /// Emit `{prefix}{N}.vtk` with positions and velocities.
    pub vtk_files: bool,
    /// Emit `{prefix}{N}_diffuse.vtk` with id/type/velocity/density attributes.
    pub vtk_diffuse_data: bool,
    /// Emit `{prefix}{N}_fluid.vtk` with per-fluid-particle field responses.
    pub vtk_fluid_data: bool,

    /// SPH smoothing length; also the bucket-grid cell side.
    pub h: f64,
    /// Fluid particle mass, uniform across particles.
    pub mass: f64,

    /// Domain box minimum corner. Diffuse particles leaving the box are
    /// deleted; the bucket grid covers exactly this region.
    pub domain_min: [f64; 3],
    /// Domain box maximum corner.
    pub domain_max: [f64; 3],

    /// Trapped-air clamp band.
    pub min_ta: f64,
    pub max_ta: f64,
    /// Wave-crest clamp band.
    pub min_wc: f64,
    pub max_wc: f64,
    /// Kinetic-energy clamp band.
    pub min_k: f64,
    pub max_k: f64,

    /// Trapped-air seeding coefficient.
    pub k_ta: f64,
    /// Wave-crest seeding coefficient.
    pub k_wc: f64,

    /// Neighbor-count threshold below which a diffuse particle is spray.
    pub spray: f64,
    /// Neighbor-count threshold above which a diffuse particle is a bubble.
    pub bubbles: f64,
    /// Foam lifetime multiplier, in frames per seeded sibling.
    pub lifetime: i32,

    /// Bubble buoyancy coefficient.
    pub k_b: f64,
    /// Bubble drag coefficient.
    pub k_d: f64,

    /// Timestep schedule, sorted by `nstep` ascending.
    pub timesteps: Vec<Timestep>,

    /// RNG seed override. `None` seeds from system entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationParams {
    /// The simulation domain box.
    pub fn domain(&self) -> Aabb {
        Aabb::new(
            DVec3::from_array(self.domain_min),
            DVec3::from_array(self.domain_max),
        )
    }

    /// Path of the input snapshot for one frame.
    pub fn input_file(&self, nstep: i32) -> PathBuf {
        PathBuf::from(&self.data_path).join(format!(
            "{}{:0width$}.vtk",
            self.file_prefix,
            nstep,
            width = self.nzeros
        ))
    }

    /// Path of one output file; `suffix` includes the extension.
    pub fn output_file(&self, nstep: i32, suffix: &str) -> PathBuf {
        PathBuf::from(&self.output_path).join(format!(
            "{}{:0width$}{}",
            self.output_prefix,
            nstep,
            suffix,
            width = self.nzeros
        ))
    }

    /// Reject malformed parameter bundles before any frame is processed.
    pub fn validate(&self) -> Result<()> {
        let err = |msg: String| Err(FoamError::InvalidParams(msg));

        if self.nstart > self.nend {
            return err(format!("nstart {} > nend {}", self.nstart, self.nend));
        }
        if !(self.h > 0.0) {
            return err(format!("smoothing length h must be positive, got {}", self.h));
        }
        if !(self.mass > 0.0) {
            return err(format!("particle mass must be positive, got {}", self.mass));
        }
        for axis in 0..3 {
            if !(self.domain_min[axis] < self.domain_max[axis]) {
                return err(format!(
                    "domain box is inverted or empty on axis {}: [{}, {}]",
                    axis, self.domain_min[axis], self.domain_max[axis]
                ));
            }
        }
        for (name, lo, hi) in [
            ("trapped-air", self.min_ta, self.max_ta),
            ("wave-crest", self.min_wc, self.max_wc),
            ("energy", self.min_k, self.max_k),
        ] {
            if !(lo < hi) {
                return err(format!("{name} clamp band is inverted: [{lo}, {hi}]"));
            }
        }
        if !(self.spray < self.bubbles) {
            return err(format!(
                "spray threshold {} must be below bubbles threshold {}",
                self.spray, self.bubbles
            ));
        }
        if self.lifetime < 0 {
            return err(format!("lifetime must be non-negative, got {}", self.lifetime));
        }
        if self.timesteps.is_empty() {
            return err("timestep schedule is empty".to_string());
        }
        for pair in self.timesteps.windows(2) {
            if pair[1].nstep <= pair[0].nstep {
                return err(format!(
                    "timestep schedule out of order: nstep {} follows {}",
                    pair[1].nstep, pair[0].nstep
                ));
            }
        }
        for ts in &self.timesteps {
            if !(ts.tout > 0.0) {
                return err(format!("timestep length must be positive, got {}", ts.tout));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> SimulationParams {
        SimulationParams {
            data_path: "data".into(),
            file_prefix: "PartFluid_".into(),
            output_path: "out".into(),
            output_prefix: "foam_".into(),
            exclusion_zone_file: String::new(),
            nstart: 0,
            nend: 10,
            nzeros: 4,
            text_files: true,
            vtk_files: false,
            vtk_diffuse_data: false,
            vtk_fluid_data: false,
            h: 0.02,
            mass: 0.008,
            domain_min: [0.0, 0.0, 0.0],
            domain_max: [2.0, 1.0, 1.0],
            min_ta: 2.0,
            max_ta: 8.0,
            min_wc: 2.0,
            max_wc: 8.0,
            min_k: 0.1,
            max_k: 5.0,
            k_ta: 4000.0,
            k_wc: 50000.0,
            spray: 6.0,
            bubbles: 20.0,
            lifetime: 4,
            k_b: 0.5,
            k_d: 0.7,
            timesteps: vec![Timestep { nstep: 0, tout: 0.1 }],
            seed: Some(7),
        }
    }

    #[test]
    fn test_valid_params_pass() {
        assert!(base_params().validate().is_ok());
    }

    #[test]
    fn test_inverted_domain_rejected() {
        let mut p = base_params();
        p.domain_max[1] = -1.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_out_of_order_schedule_rejected() {
        let mut p = base_params();
        p.timesteps = vec![
            Timestep { nstep: 5, tout: 0.1 },
            Timestep { nstep: 2, tout: 0.2 },
        ];
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_empty_schedule_rejected() {
        let mut p = base_params();
        p.timesteps.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut p = base_params();
        p.spray = 30.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_schedule_switches_one_frame_late() {
        // The entry starting at frame 5 takes effect at frame 6.
        let ts = vec![
            Timestep { nstep: 0, tout: 0.1 },
            Timestep { nstep: 5, tout: 0.2 },
        ];
        let mut cursor = 0;
        assert_eq!(current_tout(&ts, &mut cursor, 4), 0.1);
        assert_eq!(current_tout(&ts, &mut cursor, 5), 0.1);
        assert_eq!(current_tout(&ts, &mut cursor, 6), 0.2);
        assert_eq!(current_tout(&ts, &mut cursor, 7), 0.2);
    }

    #[test]
    fn test_file_name_zero_padding() {
        let p = base_params();
        assert!(p
            .input_file(42)
            .to_string_lossy()
            .ends_with("PartFluid_0042.vtk"));
        assert!(p
            .output_file(42, "_diffuse.vtk")
            .to_string_lossy()
            .ends_with("foam_0042_diffuse.vtk"));
    }

    #[test]
    fn test_params_deserialize_from_json() {
        let json = r#"{
            "data_path": "data", "file_prefix": "p_",
            "output_path": "out", "output_prefix": "o_",
            "nstart": 0, "nend": 3, "nzeros": 4,
            "text_files": true, "vtk_files": true,
            "vtk_diffuse_data": false, "vtk_fluid_data": false,
            "h": 0.02, "mass": 0.008,
            "domain_min": [0, 0, 0], "domain_max": [1, 1, 1],
            "min_ta": 2, "max_ta": 8,
            "min_wc": 2, "max_wc": 8,
            "min_k": 0.1, "max_k": 5,
            "k_ta": 4000, "k_wc": 50000,
            "spray": 6, "bubbles": 20, "lifetime": 4,
            "k_b": 0.5, "k_d": 0.7,
            "timesteps": [{"nstep": 0, "tout": 0.1}]
        }"#;
        let p: SimulationParams = serde_json::from_str(json).unwrap();
        assert!(p.validate().is_ok());
        assert!(p.exclusion_zone_file.is_empty());
        assert!(p.seed.is_none());
    }
}
