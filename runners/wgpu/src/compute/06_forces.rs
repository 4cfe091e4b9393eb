//! Every force on every sorted particle, written to the acceleration scratch buffer so that
//! integration never races with neighbours still reading positions.

use super::buffers::Buffers;
use super::builder::{workgroups_for, Builder};
use super::{dispatch, PerRole};
use crate::particle_store::BufferRole;

/// Force pass
pub struct ForcesPass {
    /// `forces.wgsl::main`
    pipeline: wgpu::ComputePipeline,
    /// Reads the sorted half
    bind_groups: PerRole<wgpu::BindGroup>,
}

impl ForcesPass {
    /// Compile and bind
    pub fn new(builder: &Builder<'_>, buffers: &Buffers) -> Self {
        let module = builder.shader(
            "forces",
            include_str!("../../../../assets/shaders/forces.wgsl"),
        );
        let layout = builder.layout(
            "forces",
            &[
                Builder::uniform_entry(0, false),
                Builder::storage_entry(1, true),
                Builder::storage_entry(2, true),
                Builder::storage_entry(3, true),
                Builder::storage_entry(4, true),
                Builder::storage_entry(5, false),
                Builder::storage_entry(6, true),
            ],
        );
        let bind_groups = PerRole::new(|role| {
            builder.bind_group(
                "forces",
                &layout,
                &[
                    &buffers.params,
                    buffers.target(role),
                    &buffers.bin_offsets,
                    &buffers.bin_counts,
                    &buffers.balls,
                    &buffers.accelerations,
                    &buffers.densities,
                ],
            )
        });
        Self {
            pipeline: builder.pipeline("forces", &layout, &module, "main"),
            bind_groups,
        }
    }

    /// Record the dispatch
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, role: BufferRole, particle_count: u32) {
        dispatch(
            encoder,
            "forces",
            &self.pipeline,
            self.bind_groups.get(role),
            &[],
            workgroups_for(particle_count),
        );
    }
}
