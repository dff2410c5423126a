use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run a shell whose transcript is an ordinary text document.
#[derive(Parser, Debug)]
#[command(name = "inkterm", version, long_about = None)]
pub struct Cli {
    /// Transcript document to open. Defaults to terminal-in-editor.md in the
    /// current directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub transcript: Option<PathBuf>,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Run each command line as a process (the default).
    Shell,
    /// Answer each command line by running PROGRAM with the line as its last argument.
    Bridge {
        program: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}
