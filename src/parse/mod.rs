#[allow(clippy::module_inception)]
mod parse;

pub use parse::{parser, DaemonConfig, LogConfig};
