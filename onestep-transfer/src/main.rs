use onestep_transfer::cli::Command;
use onestep_transfer::error::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Statistics go to stdout, so logs are kept on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Command::parse_args()?;

    args.execute().await?;

    Ok(())
}
