//! CDE module manager command line front-end.
//!
//! Thin wrapper over `cde-core`: parses a command, takes the root lock for
//! commands that change state, runs the operation and maps its outcome to
//! an exit code (0 success or skipped, 2 blocked, other non-zero on error).

mod commands;

use cde_core::CdeConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "cde-cli")]
#[command(about = "Install, upgrade and supervise CDE modules")]
struct Cli {
    /// Installation root directory
    #[arg(
        long,
        env = CdeConfig::ROOT_DIR_ENV,
        default_value = CdeConfig::DEFAULT_ROOT_DIR,
        global = true
    )]
    root: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Install a module package that is not installed yet
    Install { package: PathBuf },

    /// Upgrade an installed module from a newer package
    Upgrade { package: PathBuf },

    /// Remove an installed module
    Uninstall {
        module: String,
        /// Skip the backup archive
        #[arg(long)]
        no_backup: bool,
    },

    /// List installed modules and their executables
    List { module: Option<String> },

    /// Start a program or daemon of a module
    Start {
        module: String,
        exec: String,
        /// Arguments passed to the executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Stop a running daemon
    Stop { module: String, exec: String },

    /// Compare registered daemon pids with running processes
    Status {
        module: Option<String>,
        exec: Option<String>,
        /// Write the observed state back into the registry
        #[arg(long)]
        align: bool,
    },

    /// Report registry entries and directories that disagree
    Check,
}

impl Command {
    /// Whether the command can change the registry or the installation tree.
    fn is_mutating(&self) -> bool {
        match self {
            Command::List { .. } | Command::Check => false,
            Command::Status { align, .. } => *align,
            _ => true,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    debug!(
        "Root {} on {}",
        cli.root.display(),
        cde_core::platform::current_platform()
    );

    match commands::run(&cli.root, &cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{:#}", err);
            let code = err
                .downcast_ref::<cde_core::CdeError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_with_trailing_args() {
        let cli = Cli::try_parse_from([
            "cde-cli", "--root", "/tmp/r", "start", "canlogger", "dump", "--fast", "-n", "3",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("/tmp/r"));
        assert_eq!(
            cli.command,
            Command::Start {
                module: "canlogger".into(),
                exec: "dump".into(),
                args: vec!["--fast".into(), "-n".into(), "3".into()],
            }
        );
    }

    #[test]
    fn test_mutating_commands() {
        let parse = |args: &[&str]| {
            let mut argv = vec!["cde-cli"];
            argv.extend_from_slice(args);
            Cli::try_parse_from(argv).unwrap().command
        };
        assert!(parse(&["uninstall", "gps", "--no-backup"]).is_mutating());
        assert!(parse(&["status", "--align"]).is_mutating());
        assert!(!parse(&["status", "gps"]).is_mutating());
        assert!(!parse(&["list"]).is_mutating());
        assert!(!parse(&["check"]).is_mutating());
    }
}
