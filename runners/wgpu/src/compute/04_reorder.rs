//! Steps 4 and 5 of the sort: zero the counts so they can act as write cursors, then scatter the
//! current half into bin order in the other half. Slots beyond the active count are copied over
//! as they are.

use nebula_cpu_gpu_shared::GpuParticle;

use super::buffers::{byte_size, Buffers};
use super::builder::{workgroups_for, Builder};
use super::{dispatch, PerRole};
use crate::particle_store::BufferRole;

/// Reorder pass
pub struct ReorderPass {
    /// `reorder.wgsl::main`
    pipeline: wgpu::ComputePipeline,
    /// Current half in, other half out
    bind_groups: PerRole<wgpu::BindGroup>,
}

impl ReorderPass {
    /// Compile and bind
    pub fn new(builder: &Builder<'_>, buffers: &Buffers) -> Self {
        let module = builder.shader(
            "reorder",
            include_str!("../../../../assets/shaders/reorder.wgsl"),
        );
        let layout = builder.layout(
            "reorder",
            &[
                Builder::uniform_entry(0, false),
                Builder::storage_entry(1, true),
                Builder::storage_entry(2, false),
                Builder::storage_entry(3, true),
                Builder::storage_entry(4, false),
            ],
        );
        let bind_groups = PerRole::new(|role| {
            builder.bind_group(
                "reorder",
                &layout,
                &[
                    &buffers.params,
                    buffers.current(role),
                    buffers.target(role),
                    &buffers.bin_offsets,
                    &buffers.bin_counts,
                ],
            )
        });
        Self {
            pipeline: builder.pipeline("reorder", &layout, &module, "main"),
            bind_groups,
        }
    }

    /// Reset the cursors, carry the inactive tail and scatter
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &Buffers,
        role: BufferRole,
        particle_count: u32,
        bin_bytes: u64,
    ) {
        encoder.clear_buffer(&buffers.bin_counts, 0, Some(bin_bytes));

        let particle_bytes = byte_size::<GpuParticle>();
        let tail_offset = u64::from(particle_count).saturating_mul(particle_bytes);
        let tail_bytes = u64::from(buffers.capacity.saturating_sub(particle_count))
            .saturating_mul(particle_bytes);
        if tail_bytes > 0 {
            encoder.copy_buffer_to_buffer(
                buffers.current(role),
                tail_offset,
                buffers.target(role),
                tail_offset,
                tail_bytes,
            );
        }

        dispatch(
            encoder,
            "reorder",
            &self.pipeline,
            self.bind_groups.get(role),
            &[],
            workgroups_for(particle_count),
        );
    }
}
