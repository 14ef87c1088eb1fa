//! Line commands typed at the control panel.

use crate::registry::FocusSetting;
use std::str::FromStr;
use thiserror::Error;

/// Help text listing every command.
pub const HELP: &str = "\
Commands:
  <enter> | c | capture      capture all cameras
  c <id> | capture <id>      capture one camera
  f <id> <value|auto>        set focus (0-127 or auto)
  s | status                 show camera status
  h | help                   show this help
  q | quit                   exit";

/// A parsed panel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CaptureAll,
    CaptureOne(String),
    Focus { camera_id: String, focus: FocusSetting },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}` (type h for help)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid focus `{0}`: expected 0-127 or auto")]
    InvalidFocus(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Command::CaptureAll);
        };
        let args: Vec<&str> = words.collect();

        match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("c" | "capture", []) => Ok(Command::CaptureAll),
            ("c" | "capture", [id]) => Ok(Command::CaptureOne((*id).to_owned())),
            ("c" | "capture", _) => Err(CommandError::Usage("c [camera]")),
            ("f" | "focus", [id, value]) => {
                let focus = value
                    .parse::<FocusSetting>()
                    .ok()
                    .filter(FocusSetting::in_range)
                    .ok_or_else(|| CommandError::InvalidFocus((*value).to_owned()))?;
                Ok(Command::Focus {
                    camera_id: (*id).to_owned(),
                    focus,
                })
            }
            ("f" | "focus", _) => Err(CommandError::Usage("f <camera> <value|auto>")),
            ("s" | "status", []) => Ok(Command::Status),
            ("h" | "help" | "?", []) => Ok(Command::Help),
            ("q" | "quit" | "exit", []) => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(line.trim().to_owned())),
        }
    }
}
