use clap::Parser;
use infrastructure::config::LogFormat;

#[derive(Parser, Debug)]
#[command(
    name = "ipv6natd",
    about = "Automatically configure IPv6 NAT for running Docker containers",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Environment variables:
  DOCKER_HOST       - Docker daemon endpoint
  DOCKER_CERT_PATH  - directory containing key.pem, cert.pem and ca.pem
  DOCKER_TLS_VERIFY - enable client TLS verification",
)]
pub struct Cli {
    /// Remove all managed rules and chains when shutting down
    #[arg(long)]
    pub cleanup: bool,

    /// Keep retrying to reconnect after a disconnect
    #[arg(long)]
    pub retry: bool,

    /// Log ruleset changes (debug log level)
    #[arg(long)]
    pub debug: bool,

    /// IPv4 listen address mapping (IPV4/CIDR=IPV6,...)
    #[arg(long, value_name = "MAP")]
    pub map_ipv4: Option<String>,

    /// Log format: json (production) or text (development)
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_are_off() {
        let cli = Cli::try_parse_from(["ipv6natd"]).unwrap();
        assert!(!cli.cleanup);
        assert!(!cli.retry);
        assert!(!cli.debug);
        assert!(cli.map_ipv4.is_none());
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "ipv6natd",
            "--cleanup",
            "--retry",
            "--debug",
            "--map-ipv4",
            "10.0.0.0/8=fd00::1",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(cli.cleanup);
        assert!(cli.retry);
        assert!(cli.debug);
        assert_eq!(cli.map_ipv4.as_deref(), Some("10.0.0.0/8=fd00::1"));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn positional_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["ipv6natd", "extra"]).is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["ipv6natd", "--endpoint", "x"]).is_err());
    }
}
