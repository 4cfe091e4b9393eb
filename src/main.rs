//! Headless host for the nebula simulation.
//!
//! `NEBULA_CANVAS=WxH` sets the canvas (default 1280x720), `NEBULA_FRAMES` stops after that many
//! frames, `RUST_LOG` controls verbosity.

mod event_loop;
mod gpu_manager;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = event_loop::Settings::from_env()?;
    let manager = gpu_manager::GPUManager::setup(settings.canvas)?;
    event_loop::run(manager, &settings)
}
