use clap::Parser;

use strand_observe::{LoggerFormat, LoggerLevel};

#[derive(Debug, Parser)]
#[command(name = "strand-workerd")]
#[command(author, version, about = "Serves strand tasks to remote runners", long_about = None)]
pub struct Cli {
    /// Address to accept runner connections on.
    #[arg(long, env = "STRAND_LISTEN", default_value = "127.0.0.1:7433")]
    pub listen: String,

    /// Worker slots; defaults to the number of logical CPUs.
    #[arg(long, env = "STRAND_WORKERS")]
    pub workers: Option<usize>,

    /// Log filter, e.g. `info` or `strand_exec=debug,info`.
    #[arg(long, env = "STRAND_LOG_LEVEL", default_value = "info")]
    pub log_level: LoggerLevel,

    /// text, json or journald.
    #[arg(long, env = "STRAND_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["strand-workerd"]).unwrap();
        assert_eq!(cli.listen, "127.0.0.1:7433");
        assert_eq!(cli.workers, None);
        assert_eq!(cli.log_level.as_str(), "info");
        assert_eq!(cli.log_format, LoggerFormat::Text);
    }

    #[test]
    fn rejects_invalid_log_format() {
        assert!(Cli::try_parse_from(["strand-workerd", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn accepts_overrides() {
        let cli = Cli::try_parse_from([
            "strand-workerd",
            "--listen",
            "0.0.0.0:9000",
            "--workers",
            "3",
            "--log-level",
            "strand_exec=debug,info",
        ])
        .unwrap();
        assert_eq!(cli.listen, "0.0.0.0:9000");
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.log_level.as_str(), "strand_exec=debug,info");
    }
}
