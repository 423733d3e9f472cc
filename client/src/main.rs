use std::process::ExitCode;

use clap::Parser;
use tokio::runtime::Runtime;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use chat_client::{Client, ClientArgs, ClientError};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the chat itself
    fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn chat(args: ClientArgs) -> Result<(), ClientError> {
    let mut client = Client::connect(&args.server_addr(), args.name).await?;

    let welcome = client.register().await?;
    println!("{}", welcome);

    client.run(tokio::io::stdin(), tokio::io::stdout()).await
}

fn main() -> ExitCode {
    init_tracing();

    let args = ClientArgs::parse();

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Unable to start runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(chat(args));

    // a pending stdin read can't be cancelled, don't wait on it
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(ClientError::Rejected(reason)) => {
            eprintln!("Registration failed: {}", reason);
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("Client exited with error: {}", err);
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
