pub mod commands;
pub mod workstation_controller;

pub use commands::{AppState, ControlResponse, ParseCommandError, WorkstationCommand};
pub use workstation_controller::{control_channel, ControlHandle, WorkstationController};
