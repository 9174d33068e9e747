//! Diffuse-material post-processing for SPH fluid sequences.
//!
//! Synthesizes secondary spray, foam and bubble particles from an existing
//! sequence of SPH fluid snapshots, following Ihmsen et al.'s
//! diffuse-material model. Each input frame is a point cloud with
//! velocity and rest-density attributes; each output frame is a point
//! cloud of classified diffuse particles, advected and aged across
//! frames.
//!
//! # Example
//!
//! ```no_run
//! use foam::{FoamSimulation, SimulationParams};
//!
//! let text = std::fs::read_to_string("params.json").unwrap();
//! let params: SimulationParams = serde_json::from_str(&text).unwrap();
//! FoamSimulation::new(params).unwrap().run().unwrap();
//! ```

pub mod engine;
pub mod error;
pub mod grid;
pub mod kernels;
pub mod loader;
pub mod params;
pub mod particle;
pub mod writer;

pub use engine::{phi, DiffuseEngine, FrameDiagnostics, GRAVITY};
pub use error::{FoamError, Result};
pub use glam::DVec3;
pub use grid::{Aabb, BucketGrid, CellIndex};
pub use params::{current_tout, SimulationParams, Timestep};
pub use particle::{DiffuseParticle, FluidParticle, ParticleType};

use std::path::Path;

use log::info;

/// Batch driver: iterates the configured frame range, loads each
/// snapshot, steps the engine and emits the enabled outputs.
pub struct FoamSimulation {
    params: SimulationParams,
    engine: DiffuseEngine,
}

impl FoamSimulation {
    /// Validate the parameter bundle and set up the engine. Malformed
    /// parameters are rejected here, before any frame is touched.
    pub fn new(params: SimulationParams) -> Result<Self> {
        params.validate()?;
        let engine = DiffuseEngine::new(&params);
        Ok(Self { params, engine })
    }

    /// The persistent diffuse set, for callers embedding the driver.
    pub fn particles(&self) -> &[DiffuseParticle] {
        self.engine.particles()
    }

    /// Process the whole frame range.
    ///
    /// A missing snapshot file ends the run cleanly; that is the
    /// documented end-of-sequence signal, not an error. Output failures
    /// abort the run.
    pub fn run(&mut self) -> Result<()> {
        let exclusion = if self.params.exclusion_zone_file.is_empty() {
            None
        } else {
            Some(loader::load_exclusion_zone(Path::new(
                &self.params.exclusion_zone_file,
            ))?)
        };
        let bounds = self.params.domain();
        let mut cursor = 0usize;

        for nstep in self.params.nstart..=self.params.nend {
            let tout = current_tout(&self.params.timesteps, &mut cursor, nstep);
            let file_name = self.params.input_file(nstep);

            info!("== [ step {nstep} of {} ] ==", self.params.nend);
            info!("opening {}", file_name.display());

            let Some(grid) =
                loader::load_snapshot(&file_name, bounds, self.params.h, exclusion)?
            else {
                info!(
                    "{} not found, finishing the simulation",
                    file_name.display()
                );
                break;
            };

            info!(
                "fluid particles: {}, current timestep: {tout}",
                grid.len()
            );

            let diag = self.engine.step(&grid, tout);
            info!(
                "seeded {}, deleted {}, total diffuse particles: {}",
                diag.seeded,
                diag.deleted,
                self.engine.particles().len()
            );

            self.write_outputs(nstep, &grid, &diag)?;
        }
        Ok(())
    }

    /// Emit the enabled per-frame outputs. The four sinks are independent
    /// and written concurrently; the first failure aborts the run.
    fn write_outputs(
        &self,
        nstep: i32,
        grid: &BucketGrid,
        diag: &FrameDiagnostics,
    ) -> Result<()> {
        let sp = &self.params;
        let pp = self.engine.particles();

        let ((text, vtk), (diffuse, fluid)) = rayon::join(
            || {
                rayon::join(
                    || {
                        if sp.text_files {
                            writer::write_text(
                                &sp.output_file(nstep, ".txt"),
                                pp,
                                sp.spray,
                                sp.bubbles,
                            )
                        } else {
                            Ok(())
                        }
                    },
                    || {
                        if sp.vtk_files {
                            writer::write_vtk_positions(&sp.output_file(nstep, ".vtk"), pp)
                        } else {
                            Ok(())
                        }
                    },
                )
            },
            || {
                rayon::join(
                    || {
                        if sp.vtk_diffuse_data {
                            writer::write_vtk_diffuse(
                                &sp.output_file(nstep, "_diffuse.vtk"),
                                pp,
                                sp.spray,
                                sp.bubbles,
                            )
                        } else {
                            Ok(())
                        }
                    },
                    || {
                        if sp.vtk_fluid_data {
                            writer::write_vtk_fluid(
                                &sp.output_file(nstep, "_fluid.vtk"),
                                grid.particles(),
                                diag,
                            )
                        } else {
                            Ok(())
                        }
                    },
                )
            },
        );
        text?;
        vtk?;
        diffuse?;
        fluid?;
        Ok(())
    }
}
