pub mod event_loop;

use anyhow::{bail, Context as _, Result};

use crate::gpu_manager;

/// Canvas used when `NEBULA_CANVAS` isn't set
const DEFAULT_CANVAS: (f32, f32) = (1280.0, 720.0);

/// How the host loop runs, read from the environment
pub struct Settings {
    /// Canvas size in pixels
    pub canvas: (f32, f32),
    /// Stop after this many frames. Runs forever when `None`.
    pub frame_limit: Option<u64>,
}

impl Settings {
    /// Read `NEBULA_CANVAS` and `NEBULA_FRAMES`
    pub fn from_env() -> Result<Self> {
        let canvas = match std::env::var("NEBULA_CANVAS") {
            Ok(value) => parse_canvas(&value)?,
            Err(_) => DEFAULT_CANVAS,
        };
        let frame_limit = match std::env::var("NEBULA_FRAMES") {
            Ok(value) => Some(
                value
                    .trim()
                    .parse()
                    .with_context(|| format!("NEBULA_FRAMES isn't a frame count: {value}"))?,
            ),
            Err(_) => None,
        };
        Ok(Self {
            canvas,
            frame_limit,
        })
    }
}

/// Parse `WIDTHxHEIGHT`
fn parse_canvas(value: &str) -> Result<(f32, f32)> {
    let Some((width, height)) = value.trim().split_once(['x', 'X']) else {
        bail!("NEBULA_CANVAS should look like 1280x720, got {value}");
    };
    let width: u16 = width.parse().context("Bad NEBULA_CANVAS width")?;
    let height: u16 = height.parse().context("Bad NEBULA_CANVAS height")?;
    if width == 0 || height == 0 {
        bail!("NEBULA_CANVAS can't have a zero dimension");
    }
    Ok((f32::from(width), f32::from(height)))
}

pub fn run(gpu_manager: gpu_manager::GPUManager, settings: &Settings) -> Result<()> {
    crate::event_loop::event_loop::EventLoop::run(gpu_manager, settings)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canvas_sizes_parse() {
        assert_eq!(parse_canvas("800x600").unwrap(), (800.0, 600.0));
        assert_eq!(parse_canvas(" 1920X1080 ").unwrap(), (1920.0, 1080.0));
    }

    #[test]
    fn bad_canvas_sizes_are_refused() {
        assert!(parse_canvas("800").is_err());
        assert!(parse_canvas("0x600").is_err());
        assert!(parse_canvas("wide x tall").is_err());
    }
}
