use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Compact,
}

impl LogFormat {
    /// Parses `json` / `compact` (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset or invalid.
    pub default_directive: String,
    pub with_target: bool,
    /// Route output through the test harness capture.
    pub test_writer: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_directive: "info".to_string(),
            with_target: false,
            test_writer: false,
        }
    }
}

impl LogSettings {
    pub fn for_tests() -> Self {
        Self {
            format: LogFormat::Compact,
            default_directive: "debug".to_string(),
            with_target: true,
            test_writer: true,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

/// Install a global subscriber for `settings`.
///
/// Returns `false` when a subscriber was already installed.
pub fn install(settings: &LogSettings) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_target(settings.with_target);

    match (settings.format, settings.test_writer) {
        (LogFormat::Json, false) => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init()
            .is_ok(),
        (LogFormat::Json, true) => builder.json().with_test_writer().try_init().is_ok(),
        (LogFormat::Compact, false) => builder.compact().try_init().is_ok(),
        (LogFormat::Compact, true) => builder.compact().with_test_writer().try_init().is_ok(),
    }
}
