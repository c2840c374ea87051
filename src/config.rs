use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Prefix of environment variables read by [`AppConfig`], e.g. `PDFCHAT_BACKEND__URL`.
pub const ENV_PREFIX: &str = "PDFCHAT";

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Base URL of the ingestion / QA backend
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Milliseconds before a finished ingestion status is cleared
    #[arg(long, env = "STATUS_CLEAR_DELAY_MS")]
    pub status_clear_delay_ms: Option<u64>,

    /// Log output format (pretty or json)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upload a PDF and wait until it is ingested
    Upload {
        /// Path to the PDF
        path: PathBuf,
    },
    /// Ask a single question
    Ask {
        /// The question
        question: String,
    },
    /// Interactive session (default)
    Chat {
        /// PDF to upload before the first question
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub status_clear_delay_ms: u64,
}

impl SessionConfig {
    pub fn status_clear_delay(&self) -> Duration {
        Duration::from_millis(self.status_clear_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
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

    /// Priority: CLI flag > CLI env var > `PDFCHAT_` env > config file > defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("backend.url", "http://localhost:8000")?
            .set_default("session.status_clear_delay_ms", 2000)?
            .set_default("logging.format", "pretty")?
            .set_default("logging.filter", "info")?;

        match &cli.config {
            Some(path) => builder = builder.add_source(File::from(path.as_path()).required(true)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(url) = &cli.backend_url {
            builder = builder.set_override("backend.url", url.as_str())?;
        }
        if let Some(delay) = cli.status_clear_delay_ms {
            builder = builder.set_override("session.status_clear_delay_ms", delay)?;
        }
        if let Some(format) = &cli.log_format {
            builder = builder.set_override("logging.format", format.to_lowercase())?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let url = self.backend.url.trim();
        if url.is_empty() {
            return Err(config::ConfigError::Message(
                "backend.url cannot be empty".to_string(),
            ));
        }
        url::Url::parse(url).map_err(|e| {
            config::ConfigError::Message(format!("backend.url is not a valid URL: {e}"))
        })?;
        if self.session.status_clear_delay_ms == 0 {
            return Err(config::ConfigError::Message(
                "session.status_clear_delay_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
