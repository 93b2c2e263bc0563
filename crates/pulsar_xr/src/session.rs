//! Frame-stage lifecycle
//!
//! A session is a fixed list of stages ticked once per rendered frame in
//! registration order. Stages that feed data to later stages (such as stream
//! producers) must be registered first. Teardown runs in reverse order so a
//! consumer is always shut down before the producers it depends on.

use std::collections::HashSet;

/// Errors that can occur during session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Frame stage already registered: {0}")]
    AlreadyRegistered(&'static str),

    #[error("Frame stage shutdown failed: {0}")]
    ShutdownFailed(String),

    #[error("Session already shut down")]
    Finished,
}

/// A unit of per-frame work
pub trait FrameStage {
    /// Unique name used for registration and logs
    fn name(&self) -> &'static str;

    /// Called once per frame with the frame delta in seconds
    fn on_frame(&mut self, delta_time: f32);

    /// Release everything the stage holds. Must tolerate repeated calls.
    fn shutdown(&mut self) -> Result<(), SessionError>;
}

/// Ordered list of frame stages
#[derive(Default)]
pub struct SessionLoop {
    stages: Vec<Box<dyn FrameStage>>,
    names: HashSet<&'static str>,
    frames: u64,
    finished: bool,
}

impl SessionLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. It runs after every stage registered before it.
    pub fn register<S: FrameStage + 'static>(&mut self, stage: S) -> Result<(), SessionError> {
        if self.finished {
            return Err(SessionError::Finished);
        }

        let name = stage.name();
        if !self.names.insert(name) {
            return Err(SessionError::AlreadyRegistered(name));
        }

        tracing::debug!("[XR SESSION] Registered stage: {}", name);
        self.stages.push(Box::new(stage));
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run one frame through every stage
    pub fn run_frame(&mut self, delta_time: f32) {
        if self.finished {
            return;
        }

        for stage in &mut self.stages {
            stage.on_frame(delta_time);
        }
        self.frames += 1;
    }

    /// Shut down all stages in reverse registration order.
    ///
    /// Every stage is shut down even if an earlier one fails; the first error
    /// is returned.
    pub fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let mut first_error = None;
        for stage in self.stages.iter_mut().rev() {
            tracing::debug!("[XR SESSION] Shutting down stage: {}", stage.name());
            if let Err(err) = stage.shutdown() {
                tracing::error!("[XR SESSION] Stage {} failed to shut down: {}", stage.name(), err);
                if first_error.is_none() {
                    first_error = Some(SessionError::ShutdownFailed(format!(
                        "{}: {}",
                        stage.name(),
                        err
                    )));
                }
            }
        }

        tracing::info!("[XR SESSION] Session ended after {} frames", self.frames);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
