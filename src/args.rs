//! This module defines the command line arguments Agora accepts.

use std::path::PathBuf;
use termcolor::ColorChoice;

use crate::{cmd, db::cmd::DbCommand};


#[derive(Debug, clap::Parser)]
#[clap(about = "Backend of the Agora community platform.")]
pub(crate) struct Args {
    #[clap(subcommand)]
    pub(crate) cmd: Command,

    /// Whether to use colors when printing to stdout and stderr.
    #[clap(long, global = true, value_enum, default_value = "auto")]
    pub(crate) color: ColorTarget,
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Starts the backend HTTP server.
    Serve {
        #[clap(flatten)]
        shared: Shared,
    },

    /// Database operations.
    Db {
        #[clap(subcommand)]
        cmd: DbCommand,

        #[clap(flatten)]
        shared: Shared,
    },

    /// Checks config and DB connection to find problems in Agora's
    /// environment.
    ///
    /// Useful for updates as you can catch many errors early, without needing
    /// to restart the running Agora process. Exits with 0 if everything is
    /// Ok, and with 1 otherwise.
    Check {
        #[clap(flatten)]
        shared: Shared,
    },

    /// Outputs a template for the configuration file (which includes
    /// descriptions of all options).
    WriteConfig {
        /// Target file. If not specified, the template is written to stdout.
        target: Option<PathBuf>,
    },

    /// Exports the API as GraphQL schema.
    ExportApiSchema {
        #[clap(flatten)]
        args: cmd::export_api_schema::Args,
    },
}

#[derive(Debug, clap::Args)]
pub(crate) struct Shared {
    /// Path to the configuration file. If this is not specified, Agora will
    /// try opening `config.toml` or `/etc/agora/config.toml`.
    #[clap(short, long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ColorTarget {
    Never,
    Auto,
    Always,
}

impl Args {
    pub(crate) fn stdout_color(&self) -> ColorChoice {
        self.color_choice(std::io::IsTerminal::is_terminal(&std::io::stdout()))
    }

    pub(crate) fn stderr_color(&self) -> ColorChoice {
        self.color_choice(std::io::IsTerminal::is_terminal(&std::io::stderr()))
    }

    fn color_choice(&self, is_terminal: bool) -> ColorChoice {
        match self.color {
            ColorTarget::Never => ColorChoice::Never,
            ColorTarget::Always => ColorChoice::Always,
            ColorTarget::Auto if is_terminal => ColorChoice::Auto,
            ColorTarget::Auto => ColorChoice::Never,
        }
    }
}
