//! Command handlers: bridge CLI args to the store and output formatting.

pub mod config_cmd;
pub mod matching;
pub mod watch;
