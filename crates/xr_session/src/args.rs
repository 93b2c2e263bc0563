//! Command-line arguments for the XR session driver

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use pulsar_xr::XrCommand;

pub const DEFAULT_FRAMES: u64 = 600;

/// A command scheduled for a specific frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledCommand {
    pub frame: u64,
    pub command: XrCommand,
}

/// Scheduled commands sorted by frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script(pub Vec<ScheduledCommand>);

#[derive(Parser, Debug, Clone)]
#[command(name = "xr_session")]
#[command(about = "Run the mixed reality controller against a simulated headset", long_about = None)]
pub struct Args {
    /// Also log to the console (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Settings file (default: app data configs/xr_session.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of frames to simulate
    #[arg(long, default_value_t = DEFAULT_FRAMES)]
    pub frames: u64,

    /// Scheduled toggles, e.g. "30:pass-through,90:reflections,200:eye-offset=0.5"
    #[arg(long, value_name = "SCHEDULE", value_parser = parse_script, default_value = "")]
    pub script: Script,
}

impl Args {
    pub fn is_verbose(&self) -> bool {
        self.verbose > 0
    }
}

/// Parse `frame:command` entries separated by commas, sorted by frame.
pub fn parse_script(spec: &str) -> Result<Script, String> {
    let mut script = Vec::new();

    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (frame, command) = entry
            .split_once(':')
            .ok_or_else(|| format!("script entry `{entry}` is not `frame:command`"))?;
        let frame = frame
            .trim()
            .parse()
            .map_err(|e| format!("invalid frame in `{entry}`: {e}"))?;
        script.push(ScheduledCommand {
            frame,
            command: parse_command(command.trim())?,
        });
    }

    script.sort_by_key(|scheduled| scheduled.frame);
    Ok(Script(script))
}

fn parse_command(command: &str) -> Result<XrCommand, String> {
    if let Some(value) = command.strip_prefix("eye-offset=") {
        let value: f32 = value
            .parse()
            .map_err(|e| format!("invalid eye offset `{value}`: {e}"))?;
        return Ok(XrCommand::SetEyeOffset(value));
    }

    match command {
        "pass-through" => Ok(XrCommand::TogglePassThrough),
        "depth" | "depth-estimation" => Ok(XrCommand::ToggleDepthEstimation),
        "reflections" | "environment-reflections" => Ok(XrCommand::ToggleEnvironmentReflections),
        "eye-offset" => Ok(XrCommand::ToggleEyeOffset),
        other => Err(format!("unknown command `{other}`")),
    }
}
