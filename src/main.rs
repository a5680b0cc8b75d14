//! fleet-health operator entry point

use std::net::SocketAddr;

use clap::Parser;
use kube::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fleet_health::{controller, server, Result};

#[derive(Parser, Debug)]
#[command(name = "fleet-health-operator", version, about)]
struct Args {
    /// Address for the health and metrics endpoints
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting fleet-health operator");

    let client = Client::try_default().await?;

    let controller = controller::run_controller(client);
    let server = server::run_server(args.listen);

    tokio::select! {
        result = controller => {
            if let Err(err) = &result {
                error!("Controller exited with error: {:?}", err);
            }
            result
        }
        result = server => {
            error!("Observability server exited");
            result
        }
    }
}
