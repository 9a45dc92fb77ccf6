//! Integration tests for copying objects. The cloud tests use the default 16MiB bench file and
//! require AWS credentials, a GCS access token and test buckets.
//!

use anyhow::Result;
use dotenvy::dotenv;
use envy::prefixed;
use onestep_transfer::cli::{Command, Subcommands};
use onestep_transfer::test::TestFileBuilder;
use onestep_transfer::transfer::{encode_crc32c, TransferStats};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Configuration for integration tests.
#[derive(Debug, Deserialize)]
struct TestConfig {
    s3_uri: String,
    gs_uri: String,
    aws_endpoint_url: Option<String>,
    gcs_endpoint_url: Option<String>,
}

impl TestConfig {
    fn load() -> Result<Self> {
        dotenv()?;

        let mut env: Self = prefixed("ONESTEP_TEST_").from_env()?;
        env.s3_uri = env.s3_uri.trim_end_matches('/').to_string();
        env.gs_uri = env.gs_uri.trim_end_matches('/').to_string();

        Ok(env)
    }

    fn format_s3(&self, path: &str) -> String {
        format!("{}/{}", self.s3_uri, path)
    }

    fn format_gs(&self, path: &str) -> String {
        format!("{}/{}", self.gs_uri, path)
    }

    fn set_endpoint_urls(&self, mut commands: Vec<String>) -> Vec<String> {
        if let Some(endpoint_url) = &self.aws_endpoint_url {
            commands.extend(["--aws-endpoint-url".to_string(), endpoint_url.to_string()]);
        }
        if let Some(endpoint_url) = &self.gcs_endpoint_url {
            commands.extend(["--gcs-endpoint-url".to_string(), endpoint_url.to_string()]);
        }

        commands
    }
}

#[tokio::test]
async fn copy_local() -> Result<()> {
    let tmp = TempDir::new()?;
    let file = TestFileBuilder::default()
        .with_constant_seed()
        .with_file_size(1048576)
        .with_directory(tmp.path().to_path_buf())
        .generate()?;
    let copy_to = tmp.path().join("copy");

    let stats = execute_copy(
        file.to_string_lossy().as_ref(),
        copy_to.to_string_lossy().as_ref(),
        &["--chunk-size", "100KiB", "--concurrency", "2"],
        None,
    )
    .await?;

    assert_eq!(stats.ranges(), 11);
    assert_eq!(stats.retries(), 0);
    assert_original(&file, &copy_to)?;

    Ok(())
}

#[ignore]
#[tokio::test]
async fn copy_s3_gcs() -> Result<()> {
    let config = TestConfig::load()?;
    let file = TestFileBuilder::default().generate_bench_defaults()?;
    let expected_crc32c = encode_crc32c(crc32c::crc32c(&fs::read(&file)?));

    // Local to S3 using multiple parts.
    let s3_uri = config.format_s3("onestep_source");
    let stats = execute_copy(
        file.to_string_lossy().as_ref(),
        &s3_uri,
        &["--part-size", "5MiB"],
        Some(&config),
    )
    .await?;
    assert_eq!(stats.crc32c(), expected_crc32c);

    // S3 to GCS, with more ranges than in-flight chunks.
    let stats = execute_copy(
        &s3_uri,
        &config.format_gs("onestep_destination"),
        &["--chunk-size", "1MiB", "--concurrency", "3", "--part-size", "4MiB"],
        Some(&config),
    )
    .await?;
    assert_eq!(stats.ranges(), 16);
    assert_eq!(stats.crc32c(), expected_crc32c);

    // S3 back to a local file.
    let tmp = TempDir::new()?;
    let copy_to = tmp.path().join("onestep_copy");
    execute_copy(
        &s3_uri,
        copy_to.to_string_lossy().as_ref(),
        &[],
        Some(&config),
    )
    .await?;
    assert_original(&file, &copy_to)?;

    Ok(())
}

fn assert_original(original: &Path, copy: &Path) -> Result<()> {
    assert_eq!(fs::read(copy)?, fs::read(original)?);
    Ok(())
}

async fn execute_copy(
    from: &str,
    to: &str,
    options: &[&str],
    config: Option<&TestConfig>,
) -> Result<TransferStats> {
    let mut commands: Vec<String> = ["onestep-transfer", "copy", from, to, "--no-progress-bar"]
        .into_iter()
        .chain(options.iter().copied())
        .map(|s| s.to_string())
        .collect();
    if let Some(config) = config {
        commands = config.set_endpoint_urls(commands);
    }

    let args = Command::parse_from_iter(commands)?;
    let Subcommands::Copy(copy) = args.commands;

    Ok(copy.copy(args.timeout).await?)
}
