//! Boilerplate for shader modules, bind group layouts and pipelines

use std::borrow::Cow;

/// Every pass is written against these type declarations
const TYPES_PRELUDE: &str = include_str!("../../../../assets/shaders/types.wgsl");

/// Thin helper over a device for building the compute passes
pub struct Builder<'device> {
    /// The device everything is created on
    device: &'device wgpu::Device,
}

impl<'device> Builder<'device> {
    /// Instantiate
    pub const fn new(device: &'device wgpu::Device) -> Self {
        Self { device }
    }

    /// The device being built on
    pub const fn device(&self) -> &'device wgpu::Device {
        self.device
    }

    /// Compile a WGSL pass with the shared type prelude prepended
    pub fn shader(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        let full_source = format!("{TYPES_PRELUDE}\n{source}");
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(full_source)),
            })
    }

    /// A uniform binding. Dynamic ones are rebound at a different offset for every dispatch.
    pub const fn uniform_entry(binding: u32, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: dynamic,
                min_binding_size: None,
            },
            count: None,
        }
    }

    /// A storage binding
    pub const fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    /// A bind group layout
    pub fn layout(
        &self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> wgpu::BindGroupLayout {
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            })
    }

    /// A bind group where binding `n` is the `n`th buffer, each bound in full
    pub fn bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = (0_u32..)
            .zip(buffers)
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    /// A compute pipeline for one entry point of `module`
    pub fn pipeline(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        module: &wgpu::ShaderModule,
        entry_point: &str,
    ) -> wgpu::ComputePipeline {
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
    }
}

/// Workgroups needed to cover `items` with one invocation each
pub const fn workgroups_for(items: u32) -> u32 {
    items.div_ceil(nebula_cpu_gpu_shared::WORKGROUP_SIZE)
}
