//! GPU SPH nebula simulation.
//!
//! Particles are owned by a handful of host-simulated attractor "balls". Each step they are
//! binned and sorted on a uniform grid, then pushed around by SPH pressure and viscosity, their
//! ball's pull, and a pointer force. Every so often the colour mix of the canvas is measured;
//! once the colours have blended the population fades out and respawns.
//!
//! [`Simulation`] drives a frame. It runs on any [`SimulationBackend`]: [`CpuBackend`] is the
//! sequential reference, [`GpuBackend`] runs the same passes as wgpu compute pipelines.

// Apparently `pub use` is bad?
// https://rust-lang.github.io/rust-clippy/master/index.html#/pub_use
#![allow(clippy::pub_use)]

pub mod adaptive;
pub mod backend;
pub mod ball;
pub mod compute;
pub mod config_app;
pub mod config_shader;
pub mod cycle;
pub mod error;
pub mod homogeneity;
pub mod particle_store;
pub mod spatial_bin;
pub mod sph;
pub mod state;
pub mod theme;


pub use crate::backend::{CpuBackend, SimulationBackend};
pub use crate::compute::context::GpuContext;
pub use crate::compute::GpuBackend;
pub use crate::config_app::{ConfigStore, Param, ParamValue};
pub use crate::error::SimulationError;
pub use crate::state::Simulation;
pub use crate::theme::{Theme, ThemeRegistry};
