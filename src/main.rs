mod cli;

use clap::Parser;

#[tokio::main]
async fn main() {
    let parsed = cli::Cli::parse();
    let _guard = symdex::logging::init_logging("cli");

    if let Err(e) = cli::run(parsed).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
