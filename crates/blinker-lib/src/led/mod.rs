//! LED command model: colors, WLED state payloads and the idle/default command.

mod color;
mod command;

pub use color::{Color, channel, format_color, parse_color};
pub use command::{FX_SOLID, IdleMode, IdleSpec, LedCommand, Segment};
