//! Temp-file + rename writes.

use std::path::{Path, PathBuf};

use chartcrypt_core::{CryptError, CryptResult};
use tokio::io::AsyncWriteExt;

/// Replace `path` with `content`. Readers see the old file or the new one, never a mix.
///
/// `private` restricts the file to the owner (0600 on unix).
pub(crate) async fn atomic_replace(path: &Path, content: &[u8], private: bool) -> CryptResult<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CryptError::file(parent, e))?;
    }

    let tmp = temp_path(parent, path);
    let written = write_temp(&tmp, content, private).await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(CryptError::file(&tmp, e));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(CryptError::file(path, e));
    }

    tracing::debug!(path = %path.display(), "replaced file");
    Ok(())
}

fn temp_path(parent: &Path, path: &Path) -> PathBuf {
    parent.join(format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ))
}

async fn write_temp(tmp: &Path, content: &[u8], private: bool) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(tmp).await?;
    file.write_all(content).await?;
    file.sync_all().await
}
