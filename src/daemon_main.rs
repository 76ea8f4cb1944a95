// This runs daemon on windows without creating a console. Disable during development to see
// stdout.
#![windows_subsystem = "windows"]

use std::{env::args, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use mintick::{
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::{resolve_application_path, AppPaths},
        logging::{enable_logging, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    let command_args = args().collect::<Vec<_>>();
    let mut args = DaemonArgs::parse_from(&command_args);
    // Resolved before detaching, the daemon runs from the root directory.
    let app_dir = resolve_application_path(args.dir.take())?;

    if !args.force && detach(command_args)? {
        println!("Focus daemon started in the background");
        return Ok(());
    }
    run(args, app_dir)
}

/// Moves the daemon into the background. Returns `true` in the process that should exit.
#[cfg(feature = "win")]
fn detach(mut command_args: Vec<String>) -> Result<bool> {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::DETACHED_PROCESS;

    command_args.push("--force".into());
    let mut command = std::process::Command::new(std::env::current_exe()?);
    command
        .args(command_args.into_iter().skip(1))
        .creation_flags(DETACHED_PROCESS.0)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    #[allow(clippy::zombie_processes)]
    command.spawn()?;
    Ok(true)
}

#[cfg(all(unix, not(feature = "win")))]
fn detach(_command_args: Vec<String>) -> Result<bool> {
    use daemonize::{Daemonize, Outcome, Stdio};
    use tracing::error;

    match Daemonize::new()
        .stdout(Stdio::devnull())
        .stderr(Stdio::devnull())
        .execute()
    {
        Outcome::Parent(parent) => {
            parent.inspect_err(|e| error!("Failed to create daemon on parent side {e:?}"))?;
            Ok(true)
        }
        Outcome::Child(child) => {
            child?;
            Ok(false)
        }
    }
}

#[cfg(not(any(unix, feature = "win")))]
fn detach(_command_args: Vec<String>) -> Result<bool> {
    Ok(false)
}

fn run(args: DaemonArgs, app_dir: PathBuf) -> Result<()> {
    enable_logging(
        DAEMON_PREFIX,
        &AppPaths::new(app_dir.clone()).logs(),
        args.log,
        args.log_console,
    )?;
    let desktop_notifications = !args.no_notifications;
    single_thread_runtime()?
        .block_on(async move { start_daemon(app_dir, desktop_notifications).await })
}
