//! Rigger CLI. Plan validation, execution and directory inspection.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rigger",
    version,
    about = "Declarative provisioning plans with a versioned local state directory"
)]
struct Cli {
    #[command(subcommand)]
    command: rigger::cli::Commands,
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = rigger::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
