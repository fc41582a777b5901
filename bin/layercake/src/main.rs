//! layercake deploys interdependent contracts in dependency order and remembers what it deployed.

mod cli;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command, OutputFormat, TargetArgs};
use layercake_deploy::{Deployer, Manifest, Settings};

fn load_deployer(cli_config: Option<&std::path::Path>, target: TargetArgs) -> Result<Deployer> {
    let settings = Settings::load(cli_config)?;
    let manifest = Manifest::load_from_file(&target.manifest)?;
    Ok(Deployer::new(settings, target.network, manifest))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Values from a .env file feed the `env` attributes of the arguments below.
    match dotenvy::dotenv() {
        Err(e) if !e.not_found() => return Err(e).context("Failed to load .env file"),
        _ => {}
    }

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let options = cli.command.run_options();
    match cli.command {
        Command::Deploy { target, .. } => {
            let deployer = load_deployer(cli.config.as_deref(), target)?.with_options(options);
            let report = deployer.deploy().await?;

            println!("{}", output::report_table(&report));

            if let Some((unit, outcome)) = report.first_failure() {
                anyhow::bail!("Deployment of unit '{unit}' did not complete: {outcome}");
            }
            tracing::info!("Deployment complete");
        }
        Command::Plan { manifest } => {
            let manifest = Manifest::load_from_file(&manifest)?;
            println!("{}", output::plan_table(&manifest)?);
        }
        Command::Status { target, format } => {
            let deployer = load_deployer(cli.config.as_deref(), target)?;
            let records = deployer.records()?;
            match format {
                OutputFormat::Table => {
                    println!("{}", output::status_table(&deployer.manifest, &records))
                }
                OutputFormat::Json => {
                    let records: Vec<_> = deployer
                        .manifest
                        .units()
                        .iter()
                        .filter_map(|unit| records.get(&unit.id))
                        .collect();
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&records)
                            .context("Failed to serialize records")?
                    );
                }
            }
        }
        Command::Env { target } => {
            let deployer = load_deployer(cli.config.as_deref(), target)?;
            for (name, address) in deployer.env_exports()? {
                println!("{name}={address}");
            }
        }
    }

    Ok(())
}
