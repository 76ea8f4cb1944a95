use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{self, AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;

/// Reads the whole file under a shared lock. A missing file is not an error, it simply means
/// nothing was persisted yet.
pub async fn read_locked(path: &Path) -> Result<Option<Vec<u8>>, io::Error> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    file.lock_shared()?;
    let mut buffer = Vec::new();
    let result = file.read_to_end(&mut buffer).await;
    file.unlock_async().await?;
    result?;
    Ok(Some(buffer))
}

/// Replaces the content of `path` with `bytes`. Data is written into a sibling temporary file
/// which is then renamed over the target, so readers see either the old or the new content.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), io::Error> {
    let temp = temporary_path(path);
    debug!("Writing {} bytes into {temp:?}", bytes.len());
    let mut file = File::create(&temp).await?;
    file.lock_exclusive()?;
    let result = async {
        file.write_all(bytes).await?;
        file.sync_all().await
    }
    .await;
    file.unlock_async().await?;
    drop(file);
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    tokio::fs::rename(&temp, path).await
}

/// Removes a file, returning whether it existed.
pub async fn remove_if_exists(path: &Path) -> Result<bool, io::Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|v| v.to_os_string())
        .unwrap_or_else(|| OsString::from("data"));
    name.push(".tmp");
    path.with_file_name(name)
}
