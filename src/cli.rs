use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vitalsd")]
#[command(about = "Vital-sign listener supervisor and log retention", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $VITALSD_CONFIG or config/vitalsd.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Supervise the worker until SIGTERM or Ctrl+C
    Run,
    /// Prune logs older than the retention window once and exit
    Cleanup,
    /// Write systemd service and timer units
    Units(UnitsArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct UnitsArgs {
    /// Directory to write the unit files into
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Path of the vitalsd binary in the unit files (defaults to this executable)
    #[arg(long)]
    pub executable: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cleanup_with_global_config() {
        let cli = Cli::try_parse_from(["vitalsd", "cleanup", "--config", "/etc/vitalsd.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Cleanup));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/vitalsd.toml")));
    }

    #[test]
    fn test_parse_units_defaults() {
        let cli = Cli::try_parse_from(["vitalsd", "units"]).unwrap();
        match cli.command {
            Commands::Units(args) => {
                assert_eq!(args.out, PathBuf::from("."));
                assert!(args.executable.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
