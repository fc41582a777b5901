use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use layercake_deploy::{DEFAULT_NETWORK, RunOptions};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "layercake")]
#[command(
    author,
    version,
    about = "Deploy interdependent contracts in dependency order, once"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "LAYERCAKE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a settings file.
    ///
    /// If not provided, ./Layercake.toml is used when it exists.
    #[arg(short, long, global = true, env = "LAYERCAKE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy every unit of a manifest that is not deployed yet.
    Deploy {
        #[command(flatten)]
        target: TargetArgs,

        /// Redeploy every unit, even those already deployed.
        #[arg(long, env = "LAYERCAKE_REDEPLOY", conflicts_with = "redeploy_stale")]
        redeploy: bool,

        /// Redeploy units whose artifact or resolved arguments changed since their deployment.
        #[arg(long, env = "LAYERCAKE_REDEPLOY_STALE")]
        redeploy_stale: bool,
    },

    /// Print the deployment order of a manifest without touching any network.
    Plan {
        /// Path to the deployment manifest (TOML or JSON).
        manifest: PathBuf,
    },

    /// Show the recorded deployments of a manifest on a network.
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Output format.
        #[arg(long, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Print `<UNIT>_CONTRACT_ADDRESS=<address>` lines for every deployed unit.
    Env {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Path to the deployment manifest (TOML or JSON).
    pub manifest: PathBuf,

    /// Name of the target network, as configured in the settings.
    #[arg(short, long, env = "LAYERCAKE_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,
}

impl Command {
    pub fn run_options(&self) -> RunOptions {
        match self {
            Command::Deploy {
                redeploy,
                redeploy_stale,
                ..
            } => RunOptions {
                redeploy: *redeploy,
                redeploy_stale: *redeploy_stale,
            },
            _ => RunOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_defaults() {
        let cli = Cli::try_parse_from(["layercake", "deploy", "deploy.toml"])
            .expect("Arguments should parse");
        let options = cli.command.run_options();
        match cli.command {
            Command::Deploy { target, .. } => {
                assert_eq!(target.manifest, PathBuf::from("deploy.toml"));
                assert_eq!(target.network, DEFAULT_NETWORK);
            }
            _ => panic!("Expected the deploy command"),
        }
        assert_eq!(options, RunOptions::default());
        assert_eq!(cli.verbosity, LevelFilter::INFO);
    }

    #[test]
    fn test_deploy_flags() {
        let cli = Cli::try_parse_from([
            "layercake",
            "deploy",
            "deploy.toml",
            "--network",
            "sepolia",
            "--redeploy-stale",
            "-v",
            "debug",
        ])
        .expect("Arguments should parse");

        assert_eq!(cli.verbosity, LevelFilter::DEBUG);
        assert!(cli.command.run_options().redeploy_stale);
        assert!(
            Cli::try_parse_from([
                "layercake",
                "deploy",
                "deploy.toml",
                "--redeploy",
                "--redeploy-stale"
            ])
            .is_err(),
            "The two redeploy flags are exclusive"
        );
    }

    #[test]
    fn test_status_format() {
        let cli = Cli::try_parse_from(["layercake", "status", "deploy.toml", "--format", "json"])
            .expect("Arguments should parse");
        assert!(matches!(
            cli.command,
            Command::Status {
                format: OutputFormat::Json,
                ..
            }
        ));
    }
}
