use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "meetcap")]
#[command(about = "Record meetings: monitored audio and microphone, mixed", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// API port of the running service (default: from config)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the recording service (default)
    Serve,
    /// Start recording a capture target
    Start(StartCliArgs),
    /// Stop the current recording and save it
    Stop,
    /// Show whether a recording is running
    Status,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct StartCliArgs {
    /// Capture target: "monitor" for the first monitor source, or part of a
    /// device name
    #[arg(short, long)]
    pub target: Option<String>,
}
