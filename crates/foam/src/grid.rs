//! Uniform bucket grid over the fluid particles of one frame.

use glam::DVec3;
use rustc_hash::FxHashMap;

use crate::particle::FluidParticle;

/// Axis-aligned box.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// True when `p` lies strictly inside the box on every axis.
    #[inline]
    pub fn contains_strict(&self, p: DVec3) -> bool {
        p.x > self.min.x
            && p.y > self.min.y
            && p.z > self.min.z
            && p.x < self.max.x
            && p.y < self.max.y
            && p.z < self.max.z
    }
}

/// Integer cell coordinates within the grid.
pub type CellIndex = (i32, i32, i32);

/// Uniform grid with cell side equal to the smoothing length.
///
/// Owns the frame's fluid particles. Each particle is stored in the cell
/// `floor((coord - min) / h)` per axis; particles inside the optional
/// exclusion box, or outside the domain box, are never inserted. The grid
/// is immutable after loading and shared read-only across pass threads.
pub struct BucketGrid {
    bounds: Aabb,
    h: f64,
    dims: (i32, i32, i32),
    exclusion: Option<Aabb>,
    cells: FxHashMap<CellIndex, Vec<FluidParticle>>,
    /// All inserted particles, in id order.
    particles: Vec<FluidParticle>,
}

impl BucketGrid {
    pub fn new(bounds: Aabb, h: f64) -> Self {
        let extent = bounds.max - bounds.min;
        let dim = |e: f64| ((e / h).ceil() as i32).max(1);
        Self {
            bounds,
            h,
            dims: (dim(extent.x), dim(extent.y), dim(extent.z)),
            exclusion: None,
            cells: FxHashMap::default(),
            particles: Vec::new(),
        }
    }

    /// Suppress insertion of particles strictly inside `zone`.
    pub fn set_exclusion_zone(&mut self, zone: Aabb) {
        self.exclusion = Some(zone);
    }

    /// Insert a fluid particle, assigning it the next dense id.
    ///
    /// Returns `None` without consuming an id when the position falls in
    /// the exclusion box or outside the domain grid.
    pub fn insert(&mut self, position: DVec3, velocity: DVec3, rest_density: f64) -> Option<usize> {
        if let Some(zone) = self.exclusion {
            if zone.contains_strict(position) {
                return None;
            }
        }
        let cell = self.cell_of(position);
        if !self.cell_in_range(cell) {
            return None;
        }
        let id = self.particles.len();
        let particle = FluidParticle {
            id,
            position,
            velocity,
            rest_density,
        };
        self.particles.push(particle);
        self.cells.entry(cell).or_default().push(particle);
        Some(id)
    }

    /// Number of indexed fluid particles.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// All indexed particles in id order.
    pub fn particles(&self) -> &[FluidParticle] {
        &self.particles
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn smoothing_length(&self) -> f64 {
        self.h
    }

    /// Cell coordinates of a world position.
    #[inline]
    pub fn cell_of(&self, position: DVec3) -> CellIndex {
        let rel = (position - self.bounds.min) / self.h;
        (
            rel.x.floor() as i32,
            rel.y.floor() as i32,
            rel.z.floor() as i32,
        )
    }

    #[inline]
    fn cell_in_range(&self, (i, j, k): CellIndex) -> bool {
        i >= 0 && i < self.dims.0 && j >= 0 && j < self.dims.1 && k >= 0 && k < self.dims.2
    }

    /// Non-empty cells with their indices, sorted for deterministic iteration.
    pub fn non_empty_cells(&self) -> Vec<(CellIndex, &[FluidParticle])> {
        let mut cells: Vec<_> = self
            .cells
            .iter()
            .map(|(idx, bucket)| (*idx, bucket.as_slice()))
            .collect();
        cells.sort_unstable_by_key(|(idx, _)| *idx);
        cells
    }

    /// Contents of the up-to-27 cells around `cell`, the cell itself
    /// included. Empty and out-of-range cells are omitted.
    pub fn neighborhood(&self, cell: CellIndex) -> Vec<&[FluidParticle]> {
        let mut buckets = Vec::with_capacity(27);
        for dk in -1..=1 {
            for dj in -1..=1 {
                for di in -1..=1 {
                    let neighbor = (cell.0 + di, cell.1 + dj, cell.2 + dk);
                    if let Some(bucket) = self.cells.get(&neighbor) {
                        buckets.push(bucket.as_slice());
                    }
                }
            }
        }
        buckets
    }

    /// Neighborhood of the cell containing a world position.
    pub fn neighborhood_at(&self, position: DVec3) -> Vec<&[FluidParticle]> {
        self.neighborhood(self.cell_of(position))
    }
}
