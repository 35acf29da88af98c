mod config;
mod error;
mod format;
mod init;
mod level;
mod timezone;

pub use config::LoggerConfig;
pub use error::{LoggerError, LoggerResult};
pub use format::LoggerFormat;
pub use level::LoggerLevel;
pub use timezone::{LoggerRfc3339, LoggerTimeZone, init_local_offset};

/// Install the global tracing subscriber described by `cfg`.
///
/// Call once per process. With [`LoggerTimeZone::Local`], [`init_local_offset`] must
/// run first, before the tokio runtime spawns any thread.
///
/// ```rust
/// use strand_observe::{LoggerConfig, LoggerFormat, init_logger};
///
/// let cfg = LoggerConfig::default().with_format(LoggerFormat::Json);
/// init_logger(&cfg).expect("logger");
/// tracing::info!(worker = "w-1", "worker ready");
/// ```
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => init::text(cfg),
        LoggerFormat::Json => init::json(cfg),
        LoggerFormat::Journald => init::journald(cfg),
    }
}
