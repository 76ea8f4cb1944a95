pub mod daemon_path;
pub mod process;
pub mod report;
pub mod settings;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use report::{process_day_command, DayCommand};
use settings::{process_config_command, process_onboard_command, ConfigCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{
        start_daemon,
        storage::activity_storage::{ActivityStorage, FileActivityStorage},
    },
    utils::{
        dir::{resolve_application_path, AppPaths},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "mintick", version, long_about = None)]
#[command(about = "Focus tracker that reminds you to take breaks", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {},
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(long, help = "Only log break reminders")]
        no_notifications: bool,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Display today's activity")]
    Today {},
    #[command(about = "Display activity of a day")]
    Day {
        #[command(flatten)]
        command: DayCommand,
    },
    #[command(about = "Show or change settings")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    #[command(about = "Finish the first launch")]
    Onboard {
        #[arg(long, help = "Name to greet you with")]
        name: Option<String>,
    },
    #[command(about = "Delete all recorded activity and settings. Stops the daemon")]
    Reset {
        #[arg(long, help = "Confirm deleting everything")]
        yes: bool,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let paths = AppPaths::new(resolve_application_path(args.dir)?);

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &paths.logs(), logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => {
            restart_server(Some(paths.dir().as_path()))?;
            println!("Daemon started");
            Ok(())
        }
        Commands::Stop {} => {
            let stopped = kill_previous_servers()?;
            println!("Stopped {stopped} daemon(s)");
            Ok(())
        }
        Commands::Serve { no_notifications } => {
            start_daemon(paths.dir().clone(), !no_notifications).await?;
            Ok(())
        }
        Commands::Today {} => process_day_command(DayCommand::today(), &paths).await,
        Commands::Day { command } => process_day_command(command, &paths).await,
        Commands::Config { command } => process_config_command(command, &paths).await,
        Commands::Onboard { name } => process_onboard_command(name, &paths).await,
        Commands::Reset { yes } => {
            if !yes {
                bail!("This deletes all recorded activity and settings, pass --yes to confirm");
            }
            // A running daemon would write its data back on exit.
            kill_previous_servers()?;
            FileActivityStorage::new(paths)?.clear_all().await?;
            println!("All data cleared");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let args = Args::try_parse_from(["mintick", "day", "2024-05-01", "--hour", "9"]).unwrap();
        assert!(matches!(args.commands, Commands::Day { .. }));

        let args =
            Args::try_parse_from(["mintick", "config", "set", "--focus-minutes", "45"]).unwrap();
        assert!(matches!(
            args.commands,
            Commands::Config {
                command: ConfigCommand::Set(_)
            }
        ));

        let args = Args::try_parse_from(["mintick", "today", "--dir", "/tmp/mintick"]).unwrap();
        assert_eq!(args.dir, Some(PathBuf::from("/tmp/mintick")));

        assert!(Args::try_parse_from(["mintick", "day", "01/05/2024"]).is_err());
        assert!(Args::try_parse_from(["mintick", "day", "--hour", "24"]).is_err());
        assert!(Args::try_parse_from(["mintick", "day", "2024-05-01", "--days-ago", "1"]).is_err());
    }
}
