use clap::{Parser, Subcommand};
use paniclock::{ControllerConfig, PanicLock};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "PanicLock controller", long_about = None)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Helper socket to connect to")]
    socket: Option<PathBuf>,

    #[arg(long, help = "Do not play the confirmation sound")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Lock the screen and disable biometric unlock until the next login.
    Trigger,
    /// Install the helper if missing, reinstall it if unresponsive.
    Ensure,
    /// Check that the helper answers.
    Ping,
    /// Print the biometric timeout in seconds.
    ReadTimeout,
    /// Set the biometric timeout in seconds.
    SetTimeout { seconds: u32 },
    /// Remove the helper and the controller installation.
    Uninstall,
    /// Print the effective configuration as TOML.
    PrintConfig,
}

impl Cli {
    fn apply(&self, config: &mut ControllerConfig) {
        if let Some(socket) = &self.socket {
            config.socket_path = socket.clone();
        }
        if self.quiet {
            config.confirmation_sound = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = ControllerConfig::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);

    if cli.command == Command::PrintConfig {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let app = PanicLock::from_config(&config);
    let succeeded = match cli.command {
        Command::Trigger => {
            let outcome = app.controller.trigger_panic_lock().await;
            println!("{outcome}");
            outcome.success
        }
        Command::Ensure => {
            let readiness = app.supervisor.ensure_worker_ready().await;
            println!("helper {readiness}");
            readiness.is_ready()
        }
        Command::Ping => {
            let alive = app.supervisor.ping_with_retry().await;
            println!("{}", if alive { "alive" } else { "unresponsive" });
            alive
        }
        Command::ReadTimeout => {
            println!("{}", app.controller.read_timeout().await?);
            true
        }
        Command::SetTimeout { seconds } => {
            app.controller.set_timeout(seconds).await?;
            true
        }
        Command::Uninstall => {
            let outcome = app.controller.uninstall_worker().await;
            println!("{outcome}");
            outcome.success
        }
        Command::PrintConfig => true,
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
