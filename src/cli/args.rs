use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the cadlc binary.
#[derive(Parser, Debug)]
#[command(name = "cadlc", version, about = "CADL compiler")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a CADL entry point.
    Compile {
        /// Entry file or project directory.
        path: PathBuf,

        /// Emitter to load, as `<package>[:<name>]`. Repeatable.
        #[arg(long = "emit")]
        emit: Vec<String>,

        /// Run the full pipeline but skip emit callbacks.
        #[arg(long = "no-emit")]
        no_emit: bool,

        /// Skip loading the standard library.
        #[arg(long = "no-std-lib")]
        no_std_lib: bool,

        /// Output directory for emitters.
        #[arg(long = "output-dir")]
        output_dir: Option<PathBuf>,

        /// Additional `key=value` options passed through to libraries.
        /// Repeatable.
        #[arg(long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Only print diagnostics at or above this severity.
        #[arg(long = "diagnostic-level", value_parser = ["warning", "error"])]
        diagnostic_level: Option<String>,
    },
}
