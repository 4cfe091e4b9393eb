//! SPH density and pressure for the freshly sorted half, written to the `densities` scratch
//! buffer. The particles themselves are read-only here.

use super::buffers::Buffers;
use super::builder::{workgroups_for, Builder};
use super::{dispatch, PerRole};
use crate::particle_store::BufferRole;

/// Density pass
pub struct DensityPass {
    /// `density.wgsl::main`
    pipeline: wgpu::ComputePipeline,
    /// Works on the sorted half
    bind_groups: PerRole<wgpu::BindGroup>,
}

impl DensityPass {
    /// Compile and bind
    pub fn new(builder: &Builder<'_>, buffers: &Buffers) -> Self {
        let module = builder.shader(
            "density",
            include_str!("../../../../assets/shaders/density.wgsl"),
        );
        let layout = builder.layout(
            "density",
            &[
                Builder::uniform_entry(0, false),
                Builder::storage_entry(1, true),
                Builder::storage_entry(2, true),
                Builder::storage_entry(3, true),
                Builder::storage_entry(4, false),
            ],
        );
        let bind_groups = PerRole::new(|role| {
            builder.bind_group(
                "density",
                &layout,
                &[
                    &buffers.params,
                    buffers.target(role),
                    &buffers.bin_offsets,
                    &buffers.bin_counts,
                    &buffers.densities,
                ],
            )
        });
        Self {
            pipeline: builder.pipeline("density", &layout, &module, "main"),
            bind_groups,
        }
    }

    /// Record the dispatch
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, role: BufferRole, particle_count: u32) {
        dispatch(
            encoder,
            "density",
            &self.pipeline,
            self.bind_groups.get(role),
            &[],
            workgroups_for(particle_count),
        );
    }
}
