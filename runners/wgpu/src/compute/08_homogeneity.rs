//! Colour mixing measurement. Only encoded on frames the cycle asks for, and only while no
//! earlier result is still on its way back.

use nebula_cpu_gpu_shared::{HomogeneityCell, HomogeneityResult, HOMOGENEITY_CELLS};

use super::buffers::{byte_size, Buffers};
use super::builder::{workgroups_for, Builder};
use super::readback::StagingBuffer;
use super::{dispatch, PerRole};
use crate::backend::HomogeneityPoll;
use crate::particle_store::BufferRole;

/// Accumulate and reduce passes plus the readback they feed
pub struct HomogeneityPass {
    /// `homogeneity.wgsl::accumulate_cells`
    accumulate_pipeline: wgpu::ComputePipeline,
    /// `homogeneity.wgsl::reduce_cells`
    reduce_pipeline: wgpu::ComputePipeline,
    /// Reads the sorted, integrated half
    bind_groups: PerRole<wgpu::BindGroup>,
    /// Where the variance is mapped from
    staging: StagingBuffer,
}

impl HomogeneityPass {
    /// Compile and bind
    pub fn new(builder: &Builder<'_>, buffers: &Buffers) -> Self {
        let module = builder.shader(
            "homogeneity",
            include_str!("../../../../assets/shaders/homogeneity.wgsl"),
        );
        let layout = builder.layout(
            "homogeneity",
            &[
                Builder::uniform_entry(0, false),
                Builder::storage_entry(1, true),
                Builder::storage_entry(2, false),
                Builder::storage_entry(3, false),
            ],
        );
        let bind_groups = PerRole::new(|role| {
            builder.bind_group(
                "homogeneity",
                &layout,
                &[
                    &buffers.params,
                    buffers.target(role),
                    &buffers.homogeneity_cells,
                    &buffers.homogeneity_result,
                ],
            )
        });
        Self {
            accumulate_pipeline: builder.pipeline(
                "homogeneity_accumulate",
                &layout,
                &module,
                "accumulate_cells",
            ),
            reduce_pipeline: builder.pipeline(
                "homogeneity_reduce",
                &layout,
                &module,
                "reduce_cells",
            ),
            bind_groups,
            staging: StagingBuffer::new(
                builder.device(),
                "homogeneity_staging",
                byte_size::<HomogeneityResult>(),
            ),
        }
    }

    /// Is a result still on its way back?
    pub const fn in_flight(&self) -> bool {
        self.staging.in_flight()
    }

    /// Clear the grid, accumulate, reduce and copy the result out for mapping
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &Buffers,
        role: BufferRole,
        particle_count: u32,
    ) {
        encoder.clear_buffer(
            &buffers.homogeneity_cells,
            0,
            Some(byte_size::<[HomogeneityCell; HOMOGENEITY_CELLS]>()),
        );
        let bind_group = self.bind_groups.get(role);
        dispatch(
            encoder,
            "homogeneity_accumulate",
            &self.accumulate_pipeline,
            bind_group,
            &[],
            workgroups_for(particle_count),
        );
        dispatch(
            encoder,
            "homogeneity_reduce",
            &self.reduce_pipeline,
            bind_group,
            &[],
            1,
        );
        self.staging.copy_from(encoder, &buffers.homogeneity_result);
    }

    /// Request the map. Call once the encoder from `encode` has been submitted.
    pub fn start_readback(&mut self) {
        self.staging.start_map();
    }

    /// Check on the readback without waiting
    pub fn poll(&mut self) -> HomogeneityPoll {
        self.staging.poll(|bytes| {
            bytemuck::try_pod_read_unaligned::<HomogeneityResult>(bytes)
                .ok()
                .map(|result| result.variance)
        })
    }
}
