//! Cli commands and code.
//!

use crate::error::Error::{ConfigError, ParseError};
use crate::error::Result;
use crate::io::{ClientOptions, IoBuilder, Provider};
use crate::transfer::progress::{BarProgress, LogProgress, ProgressSink};
use crate::transfer::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::transfer::{transfer_file, TransferJobBuilder, TransferStats};
use clap::{Args, Parser, Subcommand};
use humantime::Duration;
use parse_size::parse_size;
use serde::Serialize;
use serde_json::{to_string, to_string_pretty};
use std::ffi::OsString;
use std::io::IsTerminal;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Args for the onestep-transfer CLI.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
pub struct Command {
    /// The amount of time the transfer may take. Once this timeout is reached no further ranges
    /// are read, the destination is aborted and the transfer fails.
    #[arg(global = true, short, long, env)]
    pub timeout: Option<Duration>,
    /// The subcommands for onestep-transfer.
    #[command(subcommand)]
    pub commands: Subcommands,
    /// Options related to outputting data from the CLI.
    #[command(flatten)]
    pub output: Output,
}

impl Command {
    /// Parse args and set default values.
    pub fn parse_args() -> Result<Self> {
        let args = Self::parse();
        Self::validate(&args)?;
        Ok(args)
    }

    /// Parse the command from an iterator.
    pub fn parse_from_iter<I, T>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Self::parse_from(iter);
        Self::validate(&args)?;
        Ok(args)
    }

    /// Validate commands.
    pub fn validate(args: &Self) -> Result<()> {
        match &args.commands {
            Subcommands::Copy(copy) => copy.validate(),
        }
    }

    /// Execute the command from the args.
    pub async fn execute(self) -> Result<()> {
        let pretty_json = self.output.pretty_json;
        match self.commands {
            Subcommands::Copy(copy_args) => {
                let output = copy_args.copy(self.timeout).await?;
                Self::print_stats(&output, pretty_json)?;
            }
        }

        Ok(())
    }

    /// Print output statistics
    pub fn print_stats<T>(stats: &T, pretty_json: bool) -> Result<()>
    where
        T: Serialize,
    {
        if pretty_json {
            println!("{}", to_string_pretty(stats)?);
        } else {
            println!("{}", to_string(stats)?);
        }

        Ok(())
    }
}

/// The subcommands for onestep-transfer.
#[derive(Subcommand, Debug)]
pub enum Subcommands {
    /// Copy an object by streaming ranges of the source into the destination. Supports S3 and
    /// file sources, and GCS, S3 and file destinations, e.g.
    /// `onestep-transfer copy s3://bucket/key gs://bucket/object`.
    Copy(Copy),
}

/// The copy subcommand components.
#[derive(Debug, Args)]
pub struct Copy {
    /// The source object, either `s3://bucket/key` or a file name optionally prefixed with
    /// `file://`.
    #[arg(required = true)]
    pub source: String,
    /// The destination object, either `gs://bucket/object`, `s3://bucket/key` or a file name.
    #[arg(required = true)]
    pub destination: String,
    /// The size of each ranged read of the source. This can be specified with a size unit,
    /// e.g. 8mib.
    #[arg(long, env, default_value = "64MiB", value_parser = |s: &str| parse_size(s))]
    pub chunk_size: u64,
    /// The maximum number of chunks that have been read from the source but not yet written to
    /// the destination. This bounds memory use to roughly `concurrency * chunk_size`.
    #[arg(long, env, default_value_t = 4)]
    pub concurrency: usize,
    /// The part size used when writing to the destination. For S3 this is the multipart part
    /// size and for GCS it is the resumable upload chunk size, rounded up to 256KiB.
    #[arg(long, env, default_value = "16MiB", value_parser = |s: &str| parse_size(s))]
    pub part_size: u64,
    /// The number of attempts made to read each range before the transfer fails.
    #[arg(long, env, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Log progress instead of showing a progress bar. A progress bar is only shown when
    /// stderr is a terminal.
    #[arg(long, env)]
    pub no_progress_bar: bool,
    /// Options used to connect to the object stores.
    #[command(flatten)]
    pub clients: Clients,
}

impl Copy {
    /// Validate the copy arguments.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError("--chunk-size must be greater than zero".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError("--concurrency must be at least one".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError("--max-attempts must be at least one".to_string()));
        }
        if let Provider::Gs { .. } = Provider::try_from(self.source.as_str())? {
            return Err(ParseError(format!(
                "{} is not a supported source, use an S3 url or a file",
                self.source
            )));
        }
        Provider::try_from(self.destination.as_str())?;

        Ok(())
    }

    /// Perform the copy sub command from the args.
    pub async fn copy(self, timeout: Option<Duration>) -> Result<TransferStats> {
        let io = IoBuilder::default().with_options(self.clients.to_options(self.part_size));
        let source = io.build_source(&self.source).await?;
        let writer = io.build_writer(&self.destination).await?;

        let progress: Box<dyn ProgressSink + Send + Sync> =
            if self.no_progress_bar || !std::io::stderr().is_terminal() {
                Box::new(LogProgress::default())
            } else {
                Box::new(BarProgress::new()?)
            };

        let cancel = CancellationToken::new();
        let timer = timeout.map(|timeout| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                sleep(timeout.into()).await;
                warn!("timed out after {}", timeout);
                cancel.cancel();
            })
        });

        let result = transfer_file(
            TransferJobBuilder::default()
                .with_source(source)
                .with_writer(writer)
                .with_progress(progress)
                .with_chunk_size(self.chunk_size)
                .with_concurrency(self.concurrency)
                .with_retry(RetryPolicy::default().with_max_attempts(self.max_attempts))
                .with_cancel(cancel),
        )
        .await;

        if let Some(timer) = timer {
            timer.abort();
        }

        result
    }
}

/// Options used to connect to the object stores.
#[derive(Args, Debug, Clone)]
#[group(required = false)]
pub struct Clients {
    /// The AWS region. By default, this is loaded from the AWS environment.
    #[arg(global = true, long, env)]
    pub aws_region: Option<String>,
    /// The AWS profile. By default, this is loaded from the AWS environment.
    #[arg(global = true, long, env)]
    pub aws_profile: Option<String>,
    /// A custom S3 endpoint, e.g. for S3-compatible stores. Uses path style addressing.
    #[arg(global = true, long, env)]
    pub aws_endpoint_url: Option<String>,
    /// The OAuth access token for GCS. By default, this is obtained by running
    /// `gcloud auth print-access-token`.
    #[arg(global = true, long, env, hide_env_values = true)]
    pub gcs_access_token: Option<String>,
    /// A custom GCS endpoint, e.g. for an emulator.
    #[arg(global = true, long, env)]
    pub gcs_endpoint_url: Option<String>,
}

impl Clients {
    /// Convert to client options.
    pub fn to_options(&self, part_size: u64) -> ClientOptions {
        ClientOptions {
            aws_region: self.aws_region.clone(),
            aws_profile: self.aws_profile.clone(),
            aws_endpoint_url: self.aws_endpoint_url.clone(),
            gcs_access_token: self.gcs_access_token.clone(),
            gcs_endpoint_url: self.gcs_endpoint_url.clone(),
            part_size: Some(part_size),
        }
    }
}

/// Options related to outputting information from the CLI.
#[derive(Args, Debug)]
#[group(required = false)]
pub struct Output {
    /// Print the output statistics using indented and multi-line json rather than on a single line.
    #[arg(global = true, long, env)]
    pub pretty_json: bool,
}
