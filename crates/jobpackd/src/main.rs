use clap::Parser;
use jobpack_observe::logger_init;
use jobpackd::{
    cli::{Cli, Command},
    server,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            logger_init(&args.logger_config())?;
            info!(backend = ?args.backend, "logger initialized");
            server::serve(args).await
        }
    }
}
