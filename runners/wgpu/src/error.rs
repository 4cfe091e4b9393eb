//! Errors surfaced by the simulation

/// Everything that can go wrong while setting up or stepping a simulation
#[derive(Debug)]
#[non_exhaustive]
pub enum SimulationError {
    /// No adapter matched the request
    NoAdapter,
    /// The adapter refused to give us a device
    RequestDevice(wgpu::RequestDeviceError),
    /// The device went away. All GPU resources must be rebuilt.
    DeviceLost,
    /// Mapping a readback buffer failed
    BufferMapFailed(wgpu::BufferAsyncError),
    /// The `map_async` callback was dropped without answering
    ChannelDisconnected,
    /// More particles were requested than the buffers were allocated for
    CapacityExceeded {
        /// Particles asked for
        requested: usize,
        /// Particles the buffers can hold
        capacity: usize,
    },
    /// A theme id that isn't in the registry
    UnknownTheme(String),
}

impl core::fmt::Display for SimulationError {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "No suitable GPU adapter found"),
            Self::RequestDevice(error) => write!(f, "Couldn't request GPU device: {error}"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::BufferMapFailed(error) => write!(f, "Buffer map failed: {error:?}"),
            Self::ChannelDisconnected => write!(f, "Buffer map channel disconnected"),
            Self::CapacityExceeded {
                requested,
                capacity,
            } => write!(
                f,
                "Requested {requested} particles but only {capacity} are allocated"
            ),
            Self::UnknownTheme(id) => write!(f, "Unknown theme: {id}"),
        }
    }
}

impl std::error::Error for SimulationError {}

impl From<wgpu::RequestDeviceError> for SimulationError {
    #[inline]
    fn from(error: wgpu::RequestDeviceError) -> Self {
        Self::RequestDevice(error)
    }
}

impl From<wgpu::BufferAsyncError> for SimulationError {
    #[inline]
    fn from(error: wgpu::BufferAsyncError) -> Self {
        Self::BufferMapFailed(error)
    }
}
