use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use nebula_cpu_gpu_shared::FIXED_DT;
use nebula_wgpu::SimulationError;

use super::Settings;
use crate::gpu_manager;

/// Frames between frame time reports
const REPORT_INTERVAL: u64 = 100;

pub struct EventLoop {
    frame_limit: Option<u64>,
    frames_run: u64,
    last_frame_inst: Instant,
    next_frame_inst: Instant,
    frame_count: u64,
    accum_time: f32,
}

impl EventLoop {
    pub fn run(manager: gpu_manager::GPUManager, settings: &Settings) -> Result<()> {
        let instance = Self {
            frame_limit: settings.frame_limit,
            frames_run: 0,
            last_frame_inst: Instant::now(),
            next_frame_inst: Instant::now(),
            frame_count: 0,
            accum_time: 0.0,
        };
        instance.enter(manager)
    }

    fn enter(mut self, mut manager: gpu_manager::GPUManager) -> Result<()> {
        log::info!("Entering simulation loop...");
        while !self.is_exit() {
            self.wait_for_next_frame();
            match manager.simulation.tick() {
                Ok(()) => self.frame_finished(&manager),
                Err(SimulationError::DeviceLost) => {
                    log::error!("GPU device lost, rebuilding everything");
                    manager = manager.reinit()?;
                }
                Err(error) => return Err(error).context("Simulation step failed"),
            }
        }
        log::info!("Ran {} frames, exiting", self.frames_run);
        Ok(())
    }

    fn is_exit(&self) -> bool {
        self.frame_limit
            .is_some_and(|limit| self.frames_run >= limit)
    }

    /// Sleep until the next 60Hz deadline. A late frame resets the schedule rather than
    /// running several frames back to back to catch up.
    fn wait_for_next_frame(&mut self) {
        let target_frametime = Duration::from_secs_f32(FIXED_DT);
        let now = Instant::now();
        if now < self.next_frame_inst {
            std::thread::sleep(self.next_frame_inst - now);
            self.next_frame_inst += target_frametime;
        } else {
            self.next_frame_inst = now + target_frametime;
        }
    }

    #[expect(
        clippy::as_conversions,
        clippy::cast_precision_loss,
        reason = "REPORT_INTERVAL is tiny"
    )]
    fn frame_finished(&mut self, manager: &gpu_manager::GPUManager) {
        self.frames_run = self.frames_run.saturating_add(1);
        self.accum_time += self.last_frame_inst.elapsed().as_secs_f32();
        self.last_frame_inst = Instant::now();
        self.frame_count += 1;
        if self.frame_count == REPORT_INTERVAL {
            let simulation = &manager.simulation;
            log::info!(
                "Avg frame time {:.2}ms, {} particles active, cycle {:?}",
                self.accum_time * 1000.0 / self.frame_count as f32,
                simulation.adaptive().active_particle_count(),
                simulation.cycle().state(),
            );
            self.accum_time = 0.0;
            self.frame_count = 0;
        }
    }
}
