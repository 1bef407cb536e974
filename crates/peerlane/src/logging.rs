use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with full filter directives when set.
pub const LOG_ENV: &str = "PEERLANE_LOG";

/// Crates whose events `--log-level` applies to. Everything else logs at
/// `warn` and above.
const PEERLANE_TARGETS: [&str; 5] = [
    "peerlane",
    "peerlane_core",
    "peerlane_compress",
    "peerlane_codec",
    "peerlane_association",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Filter directives for `level`: the peerlane crates at `level`, other
/// crates at `warn`, or `error` when that is quieter.
fn default_directives(level: LogLevel) -> String {
    let base = if level == LogLevel::Error { "error" } else { "warn" };
    let mut directives = vec![base.to_string()];
    directives.extend(
        PEERLANE_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_directive())),
    );
    directives.join(",")
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the stderr subscriber. Protocol chatter from the library crates
/// (advertisements, handshakes, quarantine) shows up at `debug`.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(level))
        .with_ansi(false)
        .with_target(matches!(level, LogLevel::Debug | LogLevel::Trace));

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
