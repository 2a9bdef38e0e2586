//! `coldvault-freeze <index> <bucket-path>`
//!
//! Freezes one bucket: moves it to the safe area, archives it, and sweeps the
//! failed area. The process exit code reports the outcome:
//!
//! | Outcome                         | Code |
//! |---------------------------------|------|
//! | archived, or deferred to sweep  | 0    |
//! | wrong arguments                 | -1   |
//! | bucket path is not a directory  | -2   |
//! | bucket path does not exist      | -3   |
//! | any other failure               | 1    |

use std::path::PathBuf;

use clap::{error::ErrorKind, Parser};
use coldvault_core::{ColdvaultConfig, LoggingConfig};
use coldvault_storage::{FreezeOutcome, Pipeline};
use tracing_subscriber::{fmt, EnvFilter};

const EXIT_USAGE: i32 = -1;
const EXIT_FAILURE: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "coldvault-freeze")]
#[command(about = "Freeze a bucket into the Coldvault archive", long_about = None)]
#[command(version)]
struct Cli {
    /// Index the bucket belongs to
    index: String,

    /// Local directory of the frozen bucket
    bucket_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let config = ColdvaultConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
        ColdvaultConfig::default()
    });
    init_logging(&config.logging);

    let code = match freeze(&config, &cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::error!(error = %e, "Freeze could not run");
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn freeze(config: &ColdvaultConfig, cli: &Cli) -> anyhow::Result<FreezeOutcome> {
    config.validate()?;
    let pipeline = Pipeline::from_config(config).await?;

    let outcome = pipeline
        .freezer
        .freeze_bucket(&cli.index, &cli.bucket_path)
        .await;
    tracing::info!(
        index = %cli.index,
        path = %cli.bucket_path.display(),
        exit_code = outcome.exit_code(),
        "Freeze finished"
    );
    Ok(outcome)
}

fn init_logging(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    // stdout belongs to the caller
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ColdvaultConfig {
        let mut config = ColdvaultConfig::default();
        config.storage.local_root = dir.path().join("archive-store");
        config.locations.safe_location = dir.path().join("safe");
        config.locations.fail_location = dir.path().join("failed");
        config.locations.lock_location = dir.path().join("locks");
        config.thaw.thaw_location = dir.path().join("thawed");
        config
    }

    #[test]
    fn test_two_positional_arguments() {
        let cli = Cli::try_parse_from(["coldvault-freeze", "main", "/data/db_200_100_1"]).unwrap();
        assert_eq!(cli.index, "main");
        assert_eq!(cli.bucket_path, PathBuf::from("/data/db_200_100_1"));
    }

    #[test]
    fn test_wrong_argument_count_is_rejected() {
        let missing = Cli::try_parse_from(["coldvault-freeze", "main"]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);

        let extra = Cli::try_parse_from(["coldvault-freeze", "main", "/a", "/b"]).unwrap_err();
        assert_ne!(extra.kind(), ErrorKind::DisplayHelp);
    }

    #[tokio::test]
    async fn test_exit_codes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let bucket = dir.path().join("colddb/db_200_100_1");
        std::fs::create_dir_all(&bucket).unwrap();
        std::fs::write(bucket.join("journal.gz"), b"events").unwrap();
        let file = dir.path().join("not_a_bucket");
        std::fs::write(&file, b"x").unwrap();

        let cases = [
            (bucket.clone(), 0),
            (bucket, -3),
            (file, -2),
        ];
        for (bucket_path, expected) in cases {
            let cli = Cli {
                index: "main".to_string(),
                bucket_path,
            };
            let outcome = freeze(&config, &cli).await.unwrap();
            assert_eq!(outcome.exit_code(), expected, "{outcome:?}");
        }
    }

    #[tokio::test]
    async fn test_invalid_config_does_not_freeze() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.archive.cluster_name = String::new();
        let cli = Cli {
            index: "main".to_string(),
            bucket_path: dir.path().join("db_1_0_1"),
        };

        assert!(freeze(&config, &cli).await.is_err());
    }
}
