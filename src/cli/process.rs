use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Pid, Process, Signal, System};
use tracing::{info, warn};

use super::daemon_path::to_daemon_path;

/// A daemon is either the daemon binary or the cli running `serve`.
fn is_server(process: &Process, daemon_exe: &Path, cli_exe: &Path) -> bool {
    let Some(exe) = process.exe().filter(|v| v.exists()) else {
        return false;
    };
    exe == daemon_exe || (exe == cli_exe && process.cmd().iter().any(|arg| arg == "serve"))
}

fn executables() -> Result<(PathBuf, PathBuf)> {
    let cli_exe = env::current_exe()?;
    Ok((to_daemon_path(cli_exe.clone()), cli_exe))
}

fn find_servers(system: &System) -> Result<Vec<Pid>> {
    let (daemon_exe, cli_exe) = executables()?;
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't get current process: {e}"))?;

    Ok(system
        .processes()
        .iter()
        .filter(|(pid, process)| {
            **pid != current_id
                && !matches!(process.parent(), Some(p) if p == current_id)
                && is_server(process, &daemon_exe, &cli_exe)
        })
        .map(|(pid, _)| *pid)
        .collect())
}

pub fn is_server_running() -> Result<bool> {
    let system = System::new_all();
    Ok(!find_servers(&system)?.is_empty())
}

/// Stops every running daemon. A stopped daemon saves its data on the way out. Returns how many
/// were stopped.
pub fn kill_previous_servers() -> Result<usize> {
    let system = System::new_all();
    let servers = find_servers(&system)?;
    for pid in &servers {
        let Some(process) = system.process(*pid) else {
            continue;
        };
        info!("Stopping daemon {pid}");
        // This will forcefully terminate the process on Windows. Anything better will require a
        // lot more work.
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
        process.wait();
    }
    Ok(servers.len())
}

/// Intended for shutting down previous server and starting new one. The daemon binary detaches by
/// itself; when it's missing the cli is started with `serve` as a detached process instead.
pub fn restart_server(dir: Option<&Path>) -> Result<()> {
    kill_previous_servers()?;
    let (daemon_exe, cli_exe) = executables()?;

    if daemon_exe.exists() {
        let mut command = std::process::Command::new(daemon_exe);
        if let Some(dir) = dir {
            command.arg("--dir").arg(dir);
        }
        let status = command.status()?;
        if !status.success() {
            return Err(anyhow!("Daemon failed to start: {status}"));
        }
        return Ok(());
    }

    warn!("Daemon binary is missing, serving from the cli");
    let mut command = std::process::Command::new(cli_exe);
    if let Some(dir) = dir {
        command.arg("--dir").arg(dir);
    }
    command.arg("serve");

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
    }

    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    Ok(())
}
