//! memsync - keeps the learnings digest in step with the issue tracker

use memsync::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (INFO for memsync by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("memsync=info,warn")),
        )
        .init();

    cli::run().await
}
