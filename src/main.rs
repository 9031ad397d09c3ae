// src/main.rs

use respawn::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("respawn error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let outcome = run(args).await?;
    tracing::debug!(?outcome, "launcher finished");
    Ok(())
}
