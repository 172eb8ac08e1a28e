pub mod args;
pub mod recording;

pub use args::{Cli, CliCommand, StartCliArgs};
pub use recording::handle_recording_command;
