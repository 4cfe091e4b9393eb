//! Step 1 of the sort: count the particles in every bin of the current half.

use super::buffers::Buffers;
use super::builder::{workgroups_for, Builder};
use super::{dispatch, PerRole};
use crate::particle_store::BufferRole;

/// Count pass
pub struct BinCountPass {
    /// `bin_count.wgsl::main`
    pipeline: wgpu::ComputePipeline,
    /// Reads whichever half is current
    bind_groups: PerRole<wgpu::BindGroup>,
}

impl BinCountPass {
    /// Compile and bind
    pub fn new(builder: &Builder<'_>, buffers: &Buffers) -> Self {
        let module = builder.shader(
            "bin_count",
            include_str!("../../../../assets/shaders/bin_count.wgsl"),
        );
        let layout = builder.layout(
            "bin_count",
            &[
                Builder::uniform_entry(0, false),
                Builder::storage_entry(1, true),
                Builder::storage_entry(2, false),
            ],
        );
        let bind_groups = PerRole::new(|role| {
            builder.bind_group(
                "bin_count",
                &layout,
                &[&buffers.params, buffers.current(role), &buffers.bin_counts],
            )
        });
        Self {
            pipeline: builder.pipeline("bin_count", &layout, &module, "main"),
            bind_groups,
        }
    }

    /// Zero the counts and count
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &Buffers,
        role: BufferRole,
        particle_count: u32,
        bin_bytes: u64,
    ) {
        encoder.clear_buffer(&buffers.bin_counts, 0, Some(bin_bytes));
        dispatch(
            encoder,
            "bin_count",
            &self.pipeline,
            self.bind_groups.get(role),
            &[],
            workgroups_for(particle_count),
        );
    }
}
