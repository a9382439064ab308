//! Log subscriber setup for the binaries.
//!
//! The library logs through the `log` facade. The binaries install a
//! `tracing-subscriber` fmt subscriber, which also picks up `log` records.
//!
//! - `GLOBESHOT_LOG` or `RUST_LOG`: filter directive (e.g. `globeshot=debug,warn`)
//! - `GLOBESHOT_LOG_FORMAT`: `compact` (default) or `json`

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "globeshot=info,warn";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// One JSON object per line, for log aggregation
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
    /// Colored output; off for log collectors
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Compact,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let filter = std::env::var("GLOBESHOT_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        let format = std::env::var("GLOBESHOT_LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        Self {
            filter,
            format,
            ..Self::default()
        }
    }

    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }
}

/// Install the global subscriber. Calling this twice is harmless.
pub fn init(config: LogConfig) {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true);

    let _ = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}
