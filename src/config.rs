use crate::extraction::{DEFAULT_MODEL, GeminiTransport, RetryPolicy};
use crate::rasterize::RasterizerConfig;
use clap::{Parser, Subcommand, ValueEnum};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `RCPT_PIPELINE__BATCH_SIZE=3`.
pub const ENV_PREFIX: &str = "RCPT";

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Number of concurrent workers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Receipts sent per extraction request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Storage provider ("sqlite" or "memory")
    #[arg(long)]
    pub storage: Option<String>,

    /// Database URL for the sqlite provider
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Process the given files once and exit when the pipeline settles
    Process {
        /// PDF or image files
        #[arg(required = true)]
        files: Vec<std::path::PathBuf>,
    },
    /// Write stored receipts or items as CSV
    Export {
        #[arg(long, value_enum, default_value_t = ExportKind::Receipts)]
        kind: ExportKind,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Receipts,
    Items,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub rasterizer: RasterizerConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Upper bound for one multipart upload request, in bytes.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub concurrent_limit: usize,
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_jitter_ms: u64,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    pub timeout_secs: u64,
}

impl ExtractionConfig {
    /// The configured key, falling back to the conventional Google env vars.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| env::var("GEMINI_API_KEY").ok())
            .or_else(|| env::var("GOOGLE_AI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// "sqlite" or "memory".
    pub provider: String,
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// "pretty" or "json".
    pub format: String,
}

impl LogConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3001)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.max_upload_bytes", 50 * 1024 * 1024)?
            .set_default("pipeline.concurrent_limit", 2)?
            .set_default("pipeline.batch_size", 5)?
            .set_default("extraction.base_url", GeminiTransport::DEFAULT_BASE_URL)?
            .set_default("extraction.model", DEFAULT_MODEL)?
            .set_default("extraction.max_retries", 3)?
            .set_default("extraction.initial_delay_ms", 1000)?
            .set_default("extraction.max_jitter_ms", 1000)?
            .set_default("extraction.timeout_secs", 120)?
            .set_default("storage.provider", "sqlite")?
            .set_default("storage.database_url", "sqlite://receipts.db")?
            .set_default("log.format", "pretty")?;

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        match &cli.config {
            Some(path) => builder = builder.add_source(File::with_name(path).required(true)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
            None => {}
        }

        // 3. Environment variables, e.g. RCPT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and the env vars clap maps onto them)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(limit) = cli.concurrency {
            builder = builder.set_override("pipeline.concurrent_limit", to_i64(limit))?;
        }
        if let Some(size) = cli.batch_size {
            builder = builder.set_override("pipeline.batch_size", to_i64(size))?;
        }
        if let Some(provider) = &cli.storage {
            builder = builder.set_override("storage.provider", provider.as_str())?;
        }
        if let Some(url) = &cli.database_url {
            builder = builder.set_override("storage.database_url", url.as_str())?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.pipeline.concurrent_limit == 0 {
            return Err(config::ConfigError::Message(
                "pipeline.concurrent_limit must be at least 1".to_string(),
            ));
        }
        if self.pipeline.batch_size == 0 {
            return Err(config::ConfigError::Message(
                "pipeline.batch_size must be at least 1".to_string(),
            ));
        }
        if self.extraction.max_retries == 0 {
            return Err(config::ConfigError::Message(
                "extraction.max_retries must be at least 1".to_string(),
            ));
        }
        if self.rasterizer.max_pages == 0 {
            return Err(config::ConfigError::Message(
                "rasterizer.max_pages must be at least 1".to_string(),
            ));
        }
        match self.storage.provider.as_str() {
            "sqlite" | "memory" => Ok(()),
            other => Err(config::ConfigError::Message(format!(
                "unknown storage.provider '{other}' (expected 'sqlite' or 'memory')"
            ))),
        }
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::try_parse_from(["receipt-pipeline", "process", "a.pdf", "b.jpg"]).unwrap();
        match cli.command {
            Some(Command::Process { files }) => assert_eq!(files.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["receipt-pipeline", "export", "--kind", "items"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Export {
                kind: ExportKind::Items,
                output: None
            })
        ));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = ExtractionConfig {
            base_url: GeminiTransport::DEFAULT_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            max_retries: 4,
            initial_delay_ms: 250,
            max_jitter_ms: 0,
            requests_per_minute: None,
            timeout_secs: 10,
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_jitter, Duration::ZERO);
    }
}
