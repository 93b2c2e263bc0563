//! Headless mixed-reality session driver
//!
//! Runs the feature controller against the simulated headset for a fixed
//! number of frames, applying toggles from a frame script. Useful for
//! checking controller behaviour and settings files without a device.

mod appdata;
mod args;
mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use pulsar_xr::sim::{SimHeadset, SimStreamStage};
use pulsar_xr::{FrameStage, MrFeatureController, SessionError, SessionLoop, XrSettings};

use crate::args::{Args, ScheduledCommand};

const FRAME_DELTA: f32 = 1.0 / 90.0;
const CUBEMAP_PERIOD: u64 = 3;
const METADATA_PERIOD: u64 = 1;
const STATUS_INTERVAL: u64 = 90;

/// The controller plus its pending script, driven as a single stage
struct ScriptedController {
    controller: MrFeatureController,
    script: std::vec::IntoIter<ScheduledCommand>,
    next: Option<ScheduledCommand>,
    frame: u64,
}

impl ScriptedController {
    fn new(controller: MrFeatureController, script: Vec<ScheduledCommand>) -> Self {
        let mut script = script.into_iter();
        let next = script.next();
        Self {
            controller,
            script,
            next,
            frame: 0,
        }
    }

    fn apply_due_commands(&mut self) {
        while let Some(scheduled) = self.next.filter(|s| s.frame <= self.frame) {
            match self.controller.apply(scheduled.command) {
                Ok(()) => tracing::info!("[SCRIPT] frame {}: {:?}", self.frame, scheduled.command),
                Err(e) => tracing::warn!(
                    "[SCRIPT] frame {}: {:?} failed: {}",
                    self.frame,
                    scheduled.command,
                    e
                ),
            }
            self.next = self.script.next();
        }
    }

    fn log_status(&self) {
        match serde_json::to_string(&self.controller.status()) {
            Ok(json) => tracing::info!("[STATUS] {}", json),
            Err(e) => tracing::warn!("[STATUS] could not serialize controller status: {}", e),
        }
    }
}

impl FrameStage for ScriptedController {
    fn name(&self) -> &'static str {
        "scripted_mr_features"
    }

    fn on_frame(&mut self, delta_time: f32) {
        self.apply_due_commands();
        self.controller.on_frame(delta_time);
        self.frame += 1;

        if self.frame % STATUS_INTERVAL == 0 {
            self.log_status();
        }
    }

    fn shutdown(&mut self) -> Result<(), SessionError> {
        let result = FrameStage::shutdown(&mut self.controller);
        self.log_status();
        result
    }
}

fn main() -> anyhow::Result<()> {
    let parsed = Args::parse();
    let paths = appdata::resolve()?;
    let _log_guard = logging::init(&paths.logs_dir, parsed.is_verbose())?;

    tracing::info!("Pulsar XR session starting");
    tracing::debug!("App data: {}", paths.appdata_dir.display());

    let config_path: PathBuf = parsed.config.clone().unwrap_or(paths.config_file);
    let settings = XrSettings::load_or_create(&config_path)
        .with_context(|| format!("failed to load settings from {}", config_path.display()))?;
    tracing::info!("Loaded settings from {}", config_path.display());

    run_session(&settings, &parsed)
}

fn run_session(settings: &XrSettings, parsed: &Args) -> anyhow::Result<()> {
    let (hardware, handles) = SimHeadset::build();
    let mut controller = MrFeatureController::start(hardware, settings)?;

    let startup = &settings.startup;
    if startup.pass_through {
        if let Err(e) = controller.set_pass_through(true) {
            tracing::warn!("Startup pass-through not enabled: {}", e);
        }
    }
    if startup.depth_estimation {
        if let Err(e) = controller.set_depth_estimation(true) {
            tracing::warn!("Startup depth estimation not enabled: {}", e);
        }
    }
    if startup.environment_reflections {
        if let Err(e) = controller.set_environment_reflections(true) {
            tracing::warn!("Startup environment reflections not enabled: {}", e);
        }
    }

    let mut session = SessionLoop::new();
    session.register(SimStreamStage::new(&handles, CUBEMAP_PERIOD, METADATA_PERIOD))?;
    session.register(ScriptedController::new(controller, parsed.script.0.clone()))?;

    tracing::info!(
        "Running {} frames with stages {:?}",
        parsed.frames,
        session.stage_names()
    );
    for _ in 0..parsed.frames {
        session.run_frame(FRAME_DELTA);
    }

    session.shutdown()?;

    let (opaque, submit_depth, depth_sorting) = handles.driver.flags();
    tracing::info!(
        "Device flags after session: opaque={} submit_depth={} depth_sorting={}",
        opaque,
        submit_depth,
        depth_sorting
    );
    Ok(())
}
