use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc,
};

use super::commands::{AppState, ControlResponse, WorkstationCommand};

/// Core side of the command channel. The async run loop polls it between
/// ticks; it never blocks.
pub struct WorkstationController {
    /// Command receiver from the front end
    command_rx: Receiver<WorkstationCommand>,
    /// Response sender to the front end
    response_tx: Sender<ControlResponse>,
    /// Current application state
    state: Arc<AtomicU8>,
    /// Set once the front end is gone or a shutdown was requested
    should_stop: Arc<AtomicBool>,
}

/// Front-end side of the command channel.
#[derive(Clone)]
pub struct ControlHandle {
    command_tx: Sender<WorkstationCommand>,
    response_rx: Receiver<ControlResponse>,
}

impl ControlHandle {
    /// Returns `false` when the core has shut down.
    pub fn send(&self, command: WorkstationCommand) -> bool {
        self.command_tx.send(command).is_ok()
    }

    pub fn responses(&self) -> &Receiver<ControlResponse> {
        &self.response_rx
    }
}

/// Creates a connected controller / handle pair.
pub fn control_channel() -> (WorkstationController, ControlHandle) {
    let (command_tx, command_rx) = unbounded();
    let (response_tx, response_rx) = unbounded();
    (
        WorkstationController::new(command_rx, response_tx),
        ControlHandle { command_tx, response_rx },
    )
}

fn encode(state: AppState) -> u8 {
    match state {
        AppState::Startup => 0,
        AppState::Production => 1,
        AppState::Edit => 2,
        AppState::Closing => 3,
    }
}

impl WorkstationController {
    pub fn new(command_rx: Receiver<WorkstationCommand>, response_tx: Sender<ControlResponse>) -> Self {
        Self {
            command_rx,
            response_tx,
            state: Arc::new(AtomicU8::new(encode(AppState::Startup))),
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> AppState {
        match self.state.load(Ordering::Relaxed) {
            0 => AppState::Startup,
            1 => AppState::Production,
            2 => AppState::Edit,
            _ => AppState::Closing,
        }
    }

    pub fn set_state(&self, state: AppState) {
        self.state.store(encode(state), Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::Relaxed);
    }

    /// Next pending command, if any. A disconnected front end is treated as
    /// a shutdown request.
    pub fn poll(&self) -> Option<WorkstationCommand> {
        match self.command_rx.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.should_stop() {
                    self.stop();
                    return Some(WorkstationCommand::Shutdown);
                }
                None
            }
        }
    }

    pub fn respond(&self, response: ControlResponse) {
        let _ = self.response_tx.send(response);
    }
}
