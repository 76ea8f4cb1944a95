use std::path::PathBuf;

pub const DAEMON_NAME: &str = "mintick-daemon";

/// Path of the daemon binary, which is installed next to the cli.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name(DAEMON_NAME);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
