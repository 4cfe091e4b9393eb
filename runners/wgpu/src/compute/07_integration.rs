//! Where the accelerations finally move particles, and where the render colours come from.

use super::buffers::Buffers;
use super::builder::{workgroups_for, Builder};
use super::{dispatch, PerRole};
use crate::particle_store::BufferRole;

/// Integration pass
pub struct IntegrationPass {
    /// `integrate.wgsl::main`
    pipeline: wgpu::ComputePipeline,
    /// Writes the sorted half
    bind_groups: PerRole<wgpu::BindGroup>,
}

impl IntegrationPass {
    /// Compile and bind
    pub fn new(builder: &Builder<'_>, buffers: &Buffers) -> Self {
        let module = builder.shader(
            "integrate",
            include_str!("../../../../assets/shaders/integrate.wgsl"),
        );
        let layout = builder.layout(
            "integrate",
            &[
                Builder::uniform_entry(0, false),
                Builder::storage_entry(1, false),
                Builder::storage_entry(2, true),
                Builder::storage_entry(3, false),
                Builder::storage_entry(4, true),
            ],
        );
        let bind_groups = PerRole::new(|role| {
            builder.bind_group(
                "integrate",
                &layout,
                &[
                    &buffers.params,
                    buffers.target(role),
                    &buffers.accelerations,
                    &buffers.render_colors,
                    &buffers.densities,
                ],
            )
        });
        Self {
            pipeline: builder.pipeline("integrate", &layout, &module, "main"),
            bind_groups,
        }
    }

    /// Record the dispatch
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, role: BufferRole, particle_count: u32) {
        dispatch(
            encoder,
            "integrate",
            &self.pipeline,
            self.bind_groups.get(role),
            &[],
            workgroups_for(particle_count),
        );
    }
}
