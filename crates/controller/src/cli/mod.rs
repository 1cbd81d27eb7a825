//! # OSBCTL CLI
//!
//! Talks the Open Service Broker API to a broker directly, bypassing the
//! controller. Useful to check what a broker reports while debugging a stuck
//! instance or binding.
//!
//! ## Usage
//!
//! ```bash
//! # Print a broker's catalog
//! osbctl catalog --url https://broker.example.com --username admin --password secret
//!
//! # Poll an instance operation
//! osbctl last-operation --url ... --instance <id> --service-id <id> --plan-id <id> --operation <token>
//!
//! # Poll a binding operation
//! osbctl last-operation --url ... --instance <id> --binding <id> --service-id <id> --plan-id <id>
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use controller::osbapi::{
    BrokerClient, BrokerConnection, HttpBrokerClient, LastOperationRequest,
};
use std::time::Duration;

/// Open Service Broker API CLI
#[derive(Parser)]
#[command(name = "osbctl")]
#[command(about = "Open Service Broker API CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Broker endpoint and Basic credentials
#[derive(Args)]
struct BrokerArgs {
    /// Broker base URL
    #[arg(long, env = "OSB_BROKER_URL")]
    url: String,

    #[arg(long, env = "OSB_BROKER_USERNAME")]
    username: String,

    #[arg(long, env = "OSB_BROKER_PASSWORD", hide_env_values = true)]
    password: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the broker's catalog
    Catalog {
        #[command(flatten)]
        broker: BrokerArgs,

        /// Print the raw catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the state of an instance or binding operation
    LastOperation {
        #[command(flatten)]
        broker: BrokerArgs,

        /// Service instance ID
        #[arg(long)]
        instance: String,

        /// Service binding ID; polls the binding operation when set
        #[arg(long)]
        binding: Option<String>,

        #[arg(long)]
        service_id: String,

        #[arg(long)]
        plan_id: String,

        /// Operation token returned by the broker
        #[arg(long)]
        operation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "osbctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog { broker, json } => catalog_command(&broker, json).await,
        Commands::LastOperation {
            broker,
            instance,
            binding,
            service_id,
            plan_id,
            operation,
        } => {
            let request = LastOperationRequest {
                instance_id: instance,
                binding_id: binding,
                service_id,
                plan_id,
                operation,
            };
            last_operation_command(&broker, &request).await
        }
    }
}

fn client(args: &BrokerArgs) -> Result<HttpBrokerClient> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_provider| anyhow::anyhow!("failed to install rustls crypto provider"))?;
    let http = HttpBrokerClient::build_http_client(Duration::from_secs(args.timeout), args.insecure)
        .context("Failed to build HTTP client")?;
    Ok(HttpBrokerClient::new(
        "osbctl",
        BrokerConnection::new(&args.url, &args.username, &args.password),
        http,
    ))
}

async fn catalog_command(args: &BrokerArgs, json: bool) -> Result<()> {
    let catalog = client(args)?
        .get_catalog()
        .await
        .with_context(|| format!("Failed to fetch catalog from {}", args.url))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    if catalog.services.is_empty() {
        println!("Broker offers no services.");
        return Ok(());
    }

    println!("{:<30} {:<38} {:<10} {:<10}", "SERVICE / PLAN", "ID", "BINDABLE", "VERSION");
    println!("{}", "-".repeat(90));
    for service in &catalog.services {
        println!(
            "{:<30} {:<38} {:<10} {:<10}",
            service.name, service.id, service.bindable, "-"
        );
        for plan in &service.plans {
            let version = plan
                .maintenance_info
                .as_ref()
                .map_or("-", |info| info.version.as_str());
            println!(
                "  {:<28} {:<38} {:<10} {:<10}",
                plan.name,
                plan.id,
                plan.bindable.unwrap_or(service.bindable),
                version
            );
        }
    }

    Ok(())
}

async fn last_operation_command(args: &BrokerArgs, request: &LastOperationRequest) -> Result<()> {
    let target = match &request.binding_id {
        Some(binding) => format!("binding {}/{}", request.instance_id, binding),
        None => format!("instance {}", request.instance_id),
    };

    let response = client(args)?
        .get_last_operation(request)
        .await
        .with_context(|| format!("Failed to poll last operation of {target}"))?;

    println!("Last operation of {target}:");
    println!("  State: {}", serde_json::to_value(response.state)?.as_str().unwrap_or("unknown"));
    if let Some(description) = &response.description {
        println!("  Description: {description}");
    }

    Ok(())
}
