//! Run/pause/step controller for interactive debugging
//!
//! Every trigger propagation waits on the gate before fanning out. A
//! debugger pauses the gate, then releases one propagation at a time with
//! [`ExecutionGate::step_once`] or lets the run continue with
//! [`ExecutionGate::resume`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};

/// Gate state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Propagation passes freely
    #[default]
    Running,
    /// Propagation waits until resumed or stepped
    Paused,
    /// Propagation passes once per granted step
    SingleStep,
}

#[derive(Debug, Default)]
struct GateState {
    mode: GateMode,
    steps: usize,
}

/// Controls whether trigger propagation may proceed
#[derive(Debug, Default)]
pub struct ExecutionGate {
    state: Mutex<GateState>,
    notify: Notify,
}

impl ExecutionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> GateMode {
        self.state.lock().mode
    }

    /// Stop further propagation until resumed or stepped
    pub fn pause(&self) {
        let mut state = self.state.lock();
        state.mode = GateMode::Paused;
        state.steps = 0;
        log::debug!("Execution gate paused");
    }

    /// Let propagation run freely again
    pub fn resume(&self) {
        {
            let mut state = self.state.lock();
            state.mode = GateMode::Running;
            state.steps = 0;
        }
        log::debug!("Execution gate resumed");
        self.notify.notify_waiters();
    }

    /// Release exactly one waiting (or the next) propagation
    pub fn step_once(&self) {
        {
            let mut state = self.state.lock();
            state.mode = GateMode::SingleStep;
            state.steps += 1;
        }
        log::debug!("Execution gate stepped");
        self.notify.notify_waiters();
    }

    /// Wait for permission to propagate, observing cancellation
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release between check and await is not lost
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if self.try_pass() {
                return Ok(());
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            }
        }
    }

    fn try_pass(&self) -> bool {
        let mut state = self.state.lock();
        match state.mode {
            GateMode::Running => true,
            GateMode::Paused => false,
            GateMode::SingleStep => {
                if state.steps > 0 {
                    state.steps -= 1;
                    true
                } else {
                    false
                }
            }
        }
    }
}
