use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use chat_relay::{
    cli::{Cli, Command},
    client,
    server::Server,
};

enum LogTarget {
    Stdout,
    Stderr,
}

fn init_tracing(target: LogTarget) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    // Stdout belongs to the chat transcript on the client side.
    let _ = match target {
        LogTarget::Stdout => builder
            .with_ansi(std::io::stdout().is_terminal())
            .try_init(),
        LogTarget::Stderr => builder
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .try_init(),
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            init_tracing(LogTarget::Stdout);
            let server = match Server::bind(args.into()).await {
                Ok(server) => server,
                Err(err) => {
                    error!("{err:#}");
                    return Err(err);
                }
            };
            let addr = server.local_addr()?;
            info!("server listening on {}", addr);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("server exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => {
            init_tracing(LogTarget::Stderr);
            client::run(args).await?;
        }
    }

    Ok(())
}
