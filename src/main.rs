use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::process;

use tmc_provider::config::ProviderConfig;
use tmc_provider::resource_data::ResourceData;
use tmc_provider::resources::{ProviderContext, ResourceKind};
use tmc_provider::state::{render_diff, ResourceDocument};

#[derive(Parser, Debug)]
#[command(version, about = "Manage Tanzu Mission Control resources from Terraform-shaped YAML state")]
struct Args {
    /// Path to the provider config file
    #[arg(short, long, env = "TMC_PROVIDER_CONFIG")]
    config: Option<String>,

    /// Print a colored diff between the input and the resulting state
    #[arg(long)]
    diff: bool,

    /// Write the resulting state to this file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the resource described by FILE
    Create { file: String },
    /// Refresh the state in FILE from TMC
    Read { file: String },
    /// Apply the attributes in FILE to an existing resource
    Update {
        file: String,
        /// Previously recorded state, used to detect changes to identifying attributes
        #[arg(long)]
        prior: Option<String>,
    },
    /// Delete the resource recorded in FILE
    Delete { file: String },
    /// Import an existing resource by its ID
    Import {
        /// Terraform type name, e.g. tanzu-mission-control_backup_schedule
        #[arg(long = "type")]
        resource_type: String,
        #[arg(long)]
        id: String,
    },
    /// List the supported resource and data source types
    Types,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run().await {
        error!("Application error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    if let Command::Types = args.command {
        for kind in [
            ResourceKind::BackupSchedule,
            ResourceKind::TargetLocation,
            ResourceKind::GitRepository,
            ResourceKind::HelmFeature,
            ResourceKind::Inspections,
        ] {
            let role = if kind.is_data_source() { "data source" } else { "resource" };
            println!("{} ({})", kind, role);
        }
        return Ok(());
    }

    let config = ProviderConfig::load(args.config.as_deref()).context("failed to load provider configuration")?;
    info!("Using TMC endpoint {}", config.endpoint_url());
    let ctx = ProviderContext::new(&config);

    let (kind, input, data) = match &args.command {
        Command::Import { resource_type, id } => {
            let kind: ResourceKind = resource_type.parse()?;
            let mut data = ResourceData::default().with_schema(kind.schema_keys());
            kind.import(&ctx, &mut data, id).await?;
            (kind, ResourceDocument::default(), data)
        }
        Command::Create { file } | Command::Read { file } | Command::Update { file, .. } | Command::Delete { file } => {
            let input = ResourceDocument::from_file(file).with_context(|| format!("failed to read {}", file))?;
            let kind = input.kind()?;
            let mut data = input.to_resource_data(kind);
            match &args.command {
                Command::Create { .. } => kind.create(&ctx, &mut data).await?,
                Command::Read { .. } => kind.read(&ctx, &mut data).await?,
                Command::Update { prior, .. } => {
                    if let Some(prior) = prior {
                        let prior = ResourceDocument::from_file(prior).with_context(|| format!("failed to read {}", prior))?;
                        data = data.with_prior(prior.attributes);
                    }
                    kind.update(&ctx, &mut data).await?
                }
                _ => kind.delete(&ctx, &mut data).await?,
            }
            (kind, input, data)
        }
        Command::Types => return Ok(()),
    };

    let result = ResourceDocument::from_state(kind, &data);
    if data.is_cleared() {
        info!("{} is no longer present", kind);
    }
    if args.diff {
        match render_diff(&input.to_yaml()?, &result.to_yaml()?) {
            Some(diff) => print!("{}", diff),
            None => println!("No changes."),
        }
    }
    match &args.output {
        Some(path) => result.write_to(path)?,
        None if !args.diff => print!("{}", result.to_yaml()?),
        None => {}
    }
    Ok(())
}
