//! Fluid and diffuse particle types.

use glam::DVec3;

/// A fluid particle from one input snapshot.
///
/// Ids are dense `0..N-1` within a frame and are not stable across frames;
/// the record lives only as long as the frame's bucket grid.
#[derive(Clone, Copy, Debug)]
pub struct FluidParticle {
    pub id: usize,
    pub position: DVec3,
    pub velocity: DVec3,
    /// Rest density from the snapshot, used by the color field.
    pub rest_density: f64,
}

/// Diffuse particle classification by local fluid neighbor count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticleType {
    Spray,
    Foam,
    Bubble,
}

impl ParticleType {
    /// Classify from a neighbor-count density and the two thresholds.
    /// Counts exactly at a threshold fall into the foam band.
    #[inline]
    pub fn classify(density: f64, spray: f64, bubbles: f64) -> Self {
        if density < spray {
            ParticleType::Spray
        } else if density > bubbles {
            ParticleType::Bubble
        } else {
            ParticleType::Foam
        }
    }

    /// Integer code used in the output files.
    #[inline]
    pub fn code(self) -> i32 {
        match self {
            ParticleType::Spray => 0,
            ParticleType::Foam => 1,
            ParticleType::Bubble => 2,
        }
    }
}

/// A diffuse particle carried across frames.
#[derive(Clone, Copy, Debug)]
pub struct DiffuseParticle {
    /// Globally unique, monotonically increasing over the whole run.
    pub id: u64,
    pub position: DVec3,
    pub velocity: DVec3,
    /// Remaining lifetime in frames. Only foam particles age; the particle
    /// is retired once this drops below zero.
    pub ttl: i32,
    /// Fluid neighbor count from the most recent frame.
    pub density: f64,
}

impl DiffuseParticle {
    /// Classification under the given thresholds.
    #[inline]
    pub fn particle_type(&self, spray: f64, bubbles: f64) -> ParticleType {
        ParticleType::classify(self.density, spray, bubbles)
    }
}
