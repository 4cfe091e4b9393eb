//! An acceleration structure for faster particle lookups
//! [See:](https://matthias-research.github.io/pages/tenMinutePhysics/11-hashing.pdf)
//!
//! The canvas is covered by a grid of square bins whose side is the SPH radius, so every
//! neighbour of a particle lives in its own bin or one of the 8 around it. One extra overflow bin
//! at the end collects dead and non-finite particles so they never take part in neighbour
//! searches.
//!
//! Sorting happens in the same steps on the CPU and GPU:
//!   1. Count particles per bin
//!   2. Hillis–Steele inclusive scan of the counts, `ceil(log2(bins))` ping-pong passes
//!   3. Inclusive to exclusive: `offset[i] = inclusive[i] - count[i]`
//!   4. Zero the counts and reuse them as write cursors
//!   5. Scatter every particle to `offset[bin] + cursor[bin]++` in the other buffer half
//!
//! After step 5 the cursors hold the counts again, so `offsets` and `counts` together describe
//! every bin's run of particles.

use nebula_cpu_gpu_shared::{scan_pass_count, GpuParticle, SimParams};

/// The coordinates of a bin in the grid
pub type BinCoord = (u32, u32);

/// Shape of the binning grid for one step
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BinGrid {
    /// Bins along x
    pub bins_x: u32,
    /// Bins along y
    pub bins_y: u32,
    /// `1 / bin_size`
    pub inv_bin_size: f32,
}

impl BinGrid {
    /// The grid described by a step's parameters
    #[must_use]
    #[inline]
    pub const fn from_params(params: &SimParams) -> Self {
        Self {
            bins_x: params.bins_x,
            bins_y: params.bins_y,
            inv_bin_size: params.inv_bin_size,
        }
    }

    /// Regular bins, not counting overflow
    #[must_use]
    #[inline]
    pub const fn grid_bins(&self) -> u32 {
        self.bins_x.saturating_mul(self.bins_y)
    }

    /// Index of the overflow bin
    #[must_use]
    #[inline]
    pub const fn overflow_bin(&self) -> u32 {
        self.grid_bins()
    }

    /// Bins including overflow
    #[must_use]
    #[inline]
    pub const fn total_bins(&self) -> u32 {
        self.grid_bins().saturating_add(1)
    }

    /// Given floating point coordinates find the bin in which those coordinates lie. Positions
    /// off the canvas are clamped into the edge bins. `None` for non-finite positions.
    #[must_use]
    #[inline]
    #[expect(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Values are clamped to be non-negative and within the grid first"
    )]
    pub fn coord_of(&self, position: [f32; 2]) -> Option<BinCoord> {
        let [x, y] = position;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let max_x = self.bins_x.saturating_sub(1) as f32;
        let max_y = self.bins_y.saturating_sub(1) as f32;
        let bin_x = (x * self.inv_bin_size).floor().clamp(0.0, max_x);
        let bin_y = (y * self.inv_bin_size).floor().clamp(0.0, max_y);
        Some((bin_x as u32, bin_y as u32))
    }

    /// Flatten a coordinate into a bin index
    #[must_use]
    #[inline]
    pub const fn index_of(&self, coord: BinCoord) -> u32 {
        coord.1.saturating_mul(self.bins_x).saturating_add(coord.0)
    }

    /// The bin a particle sorts into
    #[must_use]
    #[inline]
    pub fn bin_of(&self, particle: &GpuParticle) -> u32 {
        if !particle.is_alive() {
            return self.overflow_bin();
        }
        self.coord_of(particle.position)
            .map_or(self.overflow_bin(), |coord| self.index_of(coord))
    }

    /// Indices of the bin at `coord` and its up to 8 neighbours that lie on the grid
    #[must_use]
    #[inline]
    pub fn neighbourhood(&self, coord: BinCoord) -> Vec<u32> {
        let mut bins = Vec::with_capacity(9);
        for y in coord.1.saturating_sub(1)..=coord.1.saturating_add(1) {
            if y >= self.bins_y {
                continue;
            }
            for x in coord.0.saturating_sub(1)..=coord.0.saturating_add(1) {
                if x >= self.bins_x {
                    continue;
                }
                bins.push(self.index_of((x, y)));
            }
        }
        bins
    }
}

/// Per-bin population and the start of each bin's run in the sorted particle array
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BinTable {
    /// Particles in each bin, overflow last
    pub counts: Vec<u32>,
    /// Exclusive prefix sum of `counts`
    pub offsets: Vec<u32>,
}

impl BinTable {
    /// The sorted indices of the particles in `bin`
    #[must_use]
    #[inline]
    pub fn range(&self, bin: u32) -> core::ops::Range<usize> {
        let index = usize_from(bin);
        let start = self.offsets.get(index).copied().unwrap_or(0);
        let count = self.counts.get(index).copied().unwrap_or(0);
        usize_from(start)..usize_from(start.saturating_add(count))
    }

    /// Sum of every bin's count
    #[must_use]
    #[inline]
    pub fn total(&self) -> u32 {
        self.counts.iter().copied().fold(0, u32::saturating_add)
    }
}

/// Widen a `u32` index
#[expect(
    clippy::as_conversions,
    reason = "usize is at least 32 bits on every target with a GPU"
)]
#[must_use]
#[inline]
pub const fn usize_from(value: u32) -> usize {
    value as usize
}

/// Step 1: count the active particles in every bin
#[must_use]
#[inline]
pub fn count(particles: &[GpuParticle], grid: &BinGrid) -> Vec<u32> {
    let mut counts = vec![0_u32; usize_from(grid.total_bins())];
    for particle in particles {
        if let Some(bin) = counts.get_mut(usize_from(grid.bin_of(particle))) {
            *bin = bin.saturating_add(1);
        }
    }
    counts
}

/// One Hillis–Steele pass: every element adds the element `stride` places before it
#[must_use]
#[inline]
pub fn scan_pass(source: &[u32], stride: usize) -> Vec<u32> {
    source
        .iter()
        .enumerate()
        .map(|(index, value)| {
            index
                .checked_sub(stride)
                .and_then(|earlier| source.get(earlier))
                .map_or(*value, |earlier| value.saturating_add(*earlier))
        })
        .collect()
}

/// Step 2: inclusive prefix sum in `ceil(log2(n))` passes with doubling stride
#[must_use]
#[inline]
pub fn inclusive_scan(counts: &[u32]) -> Vec<u32> {
    let passes = scan_pass_count(u32::try_from(counts.len()).unwrap_or(u32::MAX));
    let mut scanned = counts.to_vec();
    for pass in 0..passes {
        scanned = scan_pass(&scanned, 1_usize << pass);
    }
    scanned
}

/// Step 3: `offset[i] = inclusive[i] - count[i]`
#[must_use]
#[inline]
pub fn exclusive_from_inclusive(inclusive: &[u32], counts: &[u32]) -> Vec<u32> {
    inclusive
        .iter()
        .zip(counts)
        .map(|(sum, own)| sum.saturating_sub(*own))
        .collect()
}

/// Steps 1 to 5: sort `source` into `destination` so that every bin's particles are contiguous.
/// Within a bin particles keep their source order on the CPU; on the GPU that order is whatever
/// the atomics resolve to.
#[inline]
pub fn sort(source: &[GpuParticle], destination: &mut [GpuParticle], grid: &BinGrid) -> BinTable {
    let counts = count(source, grid);
    let offsets = exclusive_from_inclusive(&inclusive_scan(&counts), &counts);
    log::debug!(
        "Sorting {} particles into {} bins",
        source.len(),
        counts.len()
    );

    let mut cursors = vec![0_u32; counts.len()];
    for particle in source {
        let bin = usize_from(grid.bin_of(particle));
        let (Some(cursor), Some(offset)) = (cursors.get_mut(bin), offsets.get(bin)) else {
            continue;
        };
        let slot = usize_from(offset.saturating_add(*cursor));
        *cursor = cursor.saturating_add(1);
        if let Some(target) = destination.get_mut(slot) {
            *target = *particle;
        }
    }

    BinTable {
        counts: cursors,
        offsets,
    }
}
