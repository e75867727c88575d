//! Courtside CLI entry point.

use clap::Parser;

use courtside::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = courtside::cli::run(cli).await {
        courtside::cli::handle_error(err, json);
    }
}
