use clap::Parser;
use paniclock_helperd::{run, HelperConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "PanicLock privileged helper daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Unix socket to listen on")]
    socket: Option<PathBuf>,

    #[arg(
        long,
        value_name = "MODE",
        value_parser = parse_octal_mode,
        help = "Octal permission bits for the socket (e.g. 600)"
    )]
    socket_mode: Option<u32>,

    #[arg(long, help = "Milliseconds the lowered timeout stays in place")]
    wait_ms: Option<u64>,

    #[arg(long, help = "Print the effective configuration as TOML and exit")]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut HelperConfig) {
        if let Some(socket) = &self.socket {
            config.socket_path = socket.clone();
        }
        if let Some(mode) = self.socket_mode {
            config.socket_mode = mode;
        }
        if let Some(wait_ms) = self.wait_ms {
            config.sequence.wait_ms = wait_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let mut config = HelperConfig::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    run(config).await
}

fn parse_octal_mode(value: &str) -> Result<u32, String> {
    let digits = value.trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8).map_err(|err| format!("invalid mode: {err}"))?;
    if mode > 0o777 {
        return Err(format!("mode {mode:o} out of range"));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_config_untouched() {
        let cli = Cli::try_parse_from(["paniclock-helperd"]).expect("default parse");
        let mut config = HelperConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, HelperConfig::default());
        assert!(!cli.print_config);
    }

    #[test]
    fn cli_overrides_socket_and_mode() {
        let cli = Cli::try_parse_from([
            "paniclock-helperd",
            "--socket",
            "/tmp/helper.sock",
            "--socket-mode",
            "660",
            "--wait-ms",
            "100",
        ])
        .expect("override parse");
        let mut config = HelperConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/helper.sock"));
        assert_eq!(config.socket_mode, 0o660);
        assert_eq!(config.sequence.wait_ms, 100);
    }

    #[test]
    fn cli_rejects_non_octal_mode() {
        assert!(Cli::try_parse_from(["paniclock-helperd", "--socket-mode", "689"]).is_err());
        assert!(Cli::try_parse_from(["paniclock-helperd", "--socket-mode", "7777"]).is_err());
    }
}
