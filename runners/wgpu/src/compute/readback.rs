//! Getting data back off the GPU.
//!
//! The homogeneity result goes through a [`StagingBuffer`] that never blocks: the map is
//! requested after the step is submitted and checked with `try_recv` at later frame starts. Debug
//! and test reads of whole buffers use [`read_buffer`], which waits.

use std::sync::mpsc;

use crate::backend::HomogeneityPoll;
use crate::error::SimulationError;

/// Map callback result
type MapResult = Result<(), wgpu::BufferAsyncError>;

/// A mappable buffer with at most one outstanding map request
pub struct StagingBuffer {
    /// `MAP_READ | COPY_DST`
    buffer: wgpu::Buffer,
    /// Size in bytes
    size: u64,
    /// Present while a map is outstanding
    receiver: Option<mpsc::Receiver<MapResult>>,
}

impl StagingBuffer {
    /// Allocate
    pub fn new(device: &wgpu::Device, label: &str, size: u64) -> Self {
        Self {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            size,
            receiver: None,
        }
    }

    /// Is a map request outstanding?
    pub const fn in_flight(&self) -> bool {
        self.receiver.is_some()
    }

    /// Record a copy into the staging buffer
    pub fn copy_from(&self, encoder: &mut wgpu::CommandEncoder, source: &wgpu::Buffer) {
        encoder.copy_buffer_to_buffer(source, 0, &self.buffer, 0, self.size);
    }

    /// Request the map. Only call after the copy has been submitted.
    pub fn start_map(&mut self) {
        let (sender, receiver) = mpsc::channel();
        self.buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                // The receiver is gone if the backend was dropped mid-flight
                sender.send(result).ok();
            });
        self.receiver = Some(receiver);
    }

    /// Check on the map without waiting. `read` turns the mapped bytes into a value.
    pub fn poll<F>(&mut self, read: F) -> HomogeneityPoll
    where
        F: FnOnce(&[u8]) -> Option<f32>,
    {
        let Some(receiver) = &self.receiver else {
            return HomogeneityPoll::Idle;
        };
        match receiver.try_recv() {
            Err(mpsc::TryRecvError::Empty) => HomogeneityPoll::Pending,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.receiver = None;
                log::warn!("Homogeneity readback: {}", SimulationError::ChannelDisconnected);
                HomogeneityPoll::Failed
            }
            Ok(Err(error)) => {
                self.receiver = None;
                log::warn!(
                    "Homogeneity readback: {}",
                    SimulationError::BufferMapFailed(error)
                );
                HomogeneityPoll::Failed
            }
            Ok(Ok(())) => {
                self.receiver = None;
                let value = {
                    let data = self.buffer.slice(..).get_mapped_range();
                    read(&data)
                };
                self.buffer.unmap();
                value.map_or(HomogeneityPoll::Failed, HomogeneityPoll::Ready)
            }
        }
    }
}

/// Copy `size` bytes of `source` into a fresh staging buffer and wait for them
///
/// # Errors
/// If the map fails or its callback is dropped
pub fn read_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    size: u64,
) -> Result<Vec<u8>, SimulationError> {
    if size == 0 {
        return Ok(Vec::new());
    }
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("debug_staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("debug_readback"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    queue.submit(core::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        sender.send(result).ok();
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_error| SimulationError::ChannelDisconnected)??;

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}
