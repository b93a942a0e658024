use clap::{Parser, Subcommand};
use serde_json::Value;

use service_gateway::discovery::{DiscoveryClient, GrpcRegistrationClient};

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Management CLI for the service gateway", long_about = None)]
struct Cli {
    /// Discovery HTTP endpoint.
    #[arg(short, long, env = "DISCOVERY_URL", default_value = "http://localhost:8081")]
    discovery: String,

    /// Discovery gRPC endpoint, used by `register`.
    #[arg(long, env = "DISCOVERY_GRPC_URL", default_value = "http://localhost:50051")]
    grpc: String,

    /// Gateway endpoint.
    #[arg(short, long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
    gateway: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a backend instance
    Register {
        service: String,
        address: String,
        port: u16,
    },
    /// Remove a backend instance
    Deregister {
        service: String,
        address: String,
        port: u16,
    },
    /// List the routable backends of a service
    Lookup { service: String },
    /// Check gateway and discovery status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let discovery = DiscoveryClient::new(&cli.discovery)?;

    match cli.command {
        Commands::Register {
            service,
            address,
            port,
        } => {
            let mut grpc = GrpcRegistrationClient::connect(&cli.grpc).await?;
            let result = grpc.register(&service, &address, port).await?;
            print_json(&serde_json::json!({
                "success": result.success,
                "message": result.message,
            }))?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Deregister {
            service,
            address,
            port,
        } => {
            let result = discovery.deregister(&service, &address, port).await?;
            print_json(&serde_json::to_value(&result)?)?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Lookup { service } => {
            let result = discovery.lookup(&service).await?;
            print_json(&serde_json::to_value(&result)?)?;
        }
        Commands::Status => {
            let res = reqwest::get(format!("{}/status", cli.gateway.trim_end_matches('/'))).await;
            match res {
                Ok(res) => print_response("gateway", res).await?,
                Err(e) => eprintln!("gateway: unreachable ({})", e),
            }
            match discovery.status().await {
                Ok(status) => {
                    println!("discovery:");
                    print_json(&status)?;
                }
                Err(e) => eprintln!("discovery: {}", e),
            }
        }
    }

    Ok(())
}

async fn print_response(
    name: &str,
    res: reqwest::Response,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("{}: returned status {}", name, status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}:", name);
    print_json(&json)
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
