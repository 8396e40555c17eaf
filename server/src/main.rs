use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::gateway::Server;
use server::session_store::SessionStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Seconds a game with nobody connected is kept around
    #[arg(long, default_value = "1800")]
    idle_timeout_secs: u64,

    /// Seconds between idle game sweeps
    #[arg(long, default_value = "60")]
    sweep_interval_secs: u64,

    /// Outbound messages buffered per connection
    #[arg(long, default_value = "64")]
    outbound_queue: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            idle_timeout_secs: args.idle_timeout_secs,
            sweep_interval_secs: args.sweep_interval_secs,
            outbound_queue: args.outbound_queue,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting server on {} (idle games evicted after {}s)",
        config.address(),
        config.idle_timeout_secs
    );

    let server = Server::bind(config, SessionStore::new()).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
