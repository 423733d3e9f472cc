use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use chat_server::{Server, ServerConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().compact().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = ServerConfig::parse();

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(err) => {
            error!("Unable to bind to server address {}: {}", config.addr(), err);
            return ExitCode::FAILURE;
        }
    };

    match server.local_addr() {
        Ok(addr) => info!("Server listening on {}", addr),
        Err(_) => info!("Server listening on {}", config.addr()),
    }

    if let Err(err) = server.run().await {
        error!("Server exited with error: {}", err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
