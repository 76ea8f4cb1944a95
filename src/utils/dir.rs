use std::{env, io, path::PathBuf};

use anyhow::{Context, Result};

pub const ACTIVITY_FILE: &str = "activity.json";
pub const DAILY_FILE: &str = "daily_activities.json";
pub const CONFIG_FILE: &str = "config.json";

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path =
                PathBuf::from(env::var("APPDATA").context("APPDATA should be present on Windows")?);
            path.push("mintick");
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .context("Couldn't find neither XDG_STATE_HOME nor HOME")?;
            path.push("mintick");
            path
        }
    };

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

/// Application directory given on the command line, or the default one. The result is absolute
/// so it stays valid after the daemon changes its working directory.
pub fn resolve_application_path(dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = dir.map_or_else(create_application_default_path, Ok)?;
    std::path::absolute(&dir).with_context(|| format!("Invalid application directory {dir:?}"))
}

/// Locations of every file mintick persists inside the application directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    dir: PathBuf,
}

impl AppPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn activity(&self) -> PathBuf {
        self.dir.join(ACTIVITY_FILE)
    }

    pub fn daily(&self) -> PathBuf {
        self.dir.join(DAILY_FILE)
    }

    pub fn config(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn logs(&self) -> PathBuf {
        self.dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_relative_dir_becomes_absolute() -> Result<()> {
        let resolved = resolve_application_path(Some(PathBuf::from("state/mintick")))?;
        assert!(resolved.is_absolute());
        assert_eq!(resolved, env::current_dir()?.join("state/mintick"));

        let absolute = Path::new("/var/lib/mintick");
        assert_eq!(
            resolve_application_path(Some(absolute.to_path_buf()))?,
            absolute
        );
        Ok(())
    }
}
