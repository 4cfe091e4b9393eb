//! A headless device plus a flag that trips when the device goes away

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SimulationError;

/// Device, queue and the device-lost flag
pub struct GpuContext {
    /// The logical device
    pub device: wgpu::Device,
    /// Its queue
    pub queue: wgpu::Queue,
    /// What we ended up running on
    pub adapter_info: wgpu::AdapterInfo,
    /// Set from wgpu's callbacks, never cleared. A lost context is replaced, not repaired.
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Pick an adapter and open a device on it. No surface: the simulation is compute only.
    ///
    /// # Errors
    /// When there's no adapter or it refuses a device
    #[inline]
    pub async fn request() -> Result<Self, SimulationError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(SimulationError::NoAdapter)?;
        let adapter_info = adapter.get_info();
        log::info!(
            "Using {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("nebula"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_storage_buffers_per_shader_stage: 8,
                        max_storage_buffer_binding_size: adapter_limits
                            .max_storage_buffer_binding_size,
                        max_buffer_size: adapter_limits.max_buffer_size,
                        ..wgpu::Limits::default()
                    },
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({reason:?}): {message}");
            lost_flag.store(true, Ordering::Release);
        });
        let error_flag = Arc::clone(&lost);
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("Uncaptured GPU error: {error}");
            if matches!(error, wgpu::Error::OutOfMemory { .. }) {
                error_flag.store(true, Ordering::Release);
            }
        }));

        Ok(Self {
            device,
            queue,
            adapter_info,
            lost,
        })
    }

    /// [`Self::request`], blocking the calling thread until it resolves
    ///
    /// # Errors
    /// When there's no adapter or it refuses a device
    #[inline]
    pub fn request_blocking() -> Result<Self, SimulationError> {
        pollster::block_on(Self::request())
    }

    /// Has the device gone away?
    #[must_use]
    #[inline]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// `Err(DeviceLost)` once the device has gone away
    ///
    /// # Errors
    /// When the device is lost
    #[inline]
    pub fn check(&self) -> Result<(), SimulationError> {
        if self.is_lost() {
            return Err(SimulationError::DeviceLost);
        }
        Ok(())
    }
}
