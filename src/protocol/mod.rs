//! The patch command stream: command model and wire codec.

mod command;
mod command_set;

pub use command::{Command, CommandKind, WriteError, HEADER_LEN, MAX_COUNT};
pub use command_set::CommandSet;
