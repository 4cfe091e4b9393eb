//! Steps 2 and 3 of the sort. The Prefix Sum algorithm computes a running sum of elements in an
//! array.
//!
//! For example:
//! Counts:    [0, 1, 0, 3, 2]
//! Inclusive: [0, 1, 1, 4, 6]
//! Exclusive: [0, 0, 1, 1, 4]
//!
//! The exclusive sum is where each bin's run of particles starts in the sorted half. The counts
//! are copied into the first scan buffer, then `ceil(log2(bins))` Hillis–Steele passes ping-pong
//! between the two scan buffers. Each pass reads its stride from its own slot in the scan uniform
//! buffer through a dynamic offset. Finally the exclusive pass subtracts each bin's own count.

use nebula_cpu_gpu_shared::{scan_pass_count, ScanParams, MAX_SCAN_PASSES, SCAN_PARAMS_STRIDE};

use super::buffers::{byte_size, Buffers};
use super::builder::{workgroups_for, Builder};
use super::dispatch;

/// The scan and exclusive passes
pub struct PrefixSumPass {
    /// `prefix_sum.wgsl::main`
    scan_pipeline: wgpu::ComputePipeline,
    /// `prefix_sum.wgsl::exclusive`
    exclusive_pipeline: wgpu::ComputePipeline,
    /// Scan A into B, and B into A
    scan_groups: [wgpu::BindGroup; 2],
    /// Exclusive from A, and from B
    exclusive_groups: [wgpu::BindGroup; 2],
}

impl PrefixSumPass {
    /// Compile and bind
    pub fn new(builder: &Builder<'_>, buffers: &Buffers) -> Self {
        let module = builder.shader(
            "prefix_sum",
            include_str!("../../../../assets/shaders/prefix_sum.wgsl"),
        );
        let layout = builder.layout(
            "prefix_sum",
            &[
                Builder::uniform_entry(0, true),
                Builder::storage_entry(1, true),
                Builder::storage_entry(2, false),
                Builder::storage_entry(3, true),
            ],
        );

        let [scan_a, scan_b] = &buffers.scan;
        let group = |label: &str, source: &wgpu::Buffer, destination: &wgpu::Buffer| {
            builder
                .device()
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(label),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &buffers.scan_params,
                                offset: 0,
                                size: wgpu::BufferSize::new(byte_size::<ScanParams>()),
                            }),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: source.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: destination.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: buffers.bin_counts.as_entire_binding(),
                        },
                    ],
                })
        };

        Self {
            scan_pipeline: builder.pipeline("prefix_sum_scan", &layout, &module, "main"),
            exclusive_pipeline: builder.pipeline(
                "prefix_sum_exclusive",
                &layout,
                &module,
                "exclusive",
            ),
            scan_groups: [
                group("scan_a_to_b", scan_a, scan_b),
                group("scan_b_to_a", scan_b, scan_a),
            ],
            exclusive_groups: [
                group("exclusive_from_a", scan_a, &buffers.bin_offsets),
                group("exclusive_from_b", scan_b, &buffers.bin_offsets),
            ],
        }
    }

    /// Upload one `ScanParams` per pass. Pass 0's slot is also what the exclusive pass reads.
    pub fn write_params(queue: &wgpu::Queue, buffers: &Buffers, bins: u32) -> u32 {
        let passes = scan_passes(bins);
        for pass in 0..passes.max(1) {
            let params = ScanParams {
                element_count: bins,
                stride: 1_u32.checked_shl(pass).unwrap_or(u32::MAX),
                _padding: [0; 2],
            };
            queue.write_buffer(
                &buffers.scan_params,
                u64::from(pass).saturating_mul(SCAN_PARAMS_STRIDE),
                bytemuck::bytes_of(&params),
            );
        }
        log::debug!("Prefix sum over {bins} bins in {passes} passes");
        passes
    }

    /// Copy the counts in, scan, and write the exclusive offsets
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &Buffers,
        bins: u32,
        passes: u32,
        bin_bytes: u64,
    ) {
        let [scan_a, _] = &buffers.scan;
        encoder.copy_buffer_to_buffer(&buffers.bin_counts, 0, scan_a, 0, bin_bytes);

        let [a_to_b, b_to_a] = &self.scan_groups;
        for pass in 0..passes {
            let group = if pass % 2 == 0 { a_to_b } else { b_to_a };
            dispatch(
                encoder,
                "prefix_sum_scan",
                &self.scan_pipeline,
                group,
                &[scan_offset(pass)],
                workgroups_for(bins),
            );
        }

        let [from_a, from_b] = &self.exclusive_groups;
        let inclusive = if passes % 2 == 0 { from_a } else { from_b };
        dispatch(
            encoder,
            "prefix_sum_exclusive",
            &self.exclusive_pipeline,
            inclusive,
            &[0],
            workgroups_for(bins),
        );
    }
}

/// Dynamic offset of a pass's `ScanParams`
fn scan_offset(pass: u32) -> u32 {
    u32::try_from(SCAN_PARAMS_STRIDE)
        .unwrap_or(u32::MAX)
        .saturating_mul(pass)
}

/// Passes for `bins`, limited to the slots the scan params buffer has
fn scan_passes(bins: u32) -> u32 {
    let needed = scan_pass_count(bins);
    if needed > MAX_SCAN_PASSES {
        log::warn!(
            "Prefix sum over {bins} bins needs {needed} passes, only {MAX_SCAN_PASSES} fit. \
             Bin offsets will be wrong."
        );
        return MAX_SCAN_PASSES;
    }
    needed
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pass_count_follows_the_bins() {
        assert_eq!(scan_passes(0), 0);
        assert_eq!(scan_passes(2), 1);
        assert_eq!(scan_passes(1025), 11);
    }

    #[test]
    fn every_bin_count_fits_the_params_buffer() {
        assert_eq!(scan_pass_count(u32::MAX), MAX_SCAN_PASSES);
        assert_eq!(scan_passes(u32::MAX), MAX_SCAN_PASSES);
    }
}
