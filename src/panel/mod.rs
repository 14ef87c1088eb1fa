//! Terminal control panel: line commands in, status text out.

mod board;
mod command;

pub use board::{render_batch, render_result, CameraState, CameraStatus, StatusBoard};
pub use command::{Command, CommandError, HELP};
