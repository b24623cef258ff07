use crate::error::Result;
use log::debug;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Hidden sibling of `path` used while an artifact is being produced.
///
/// The original extension is kept last so tools that pick an output format
/// from the file name (ffmpeg, the `image` crate) still see it.
pub fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let tmp_name = match path.extension() {
        Some(ext) => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            format!(".{}.{}.partial.{}", stem, std::process::id(), ext.to_string_lossy())
        }
        None => format!(".{}.{}.partial", name, std::process::id()),
    };
    path.with_file_name(tmp_name)
}

/// Writes `data` to `path` so that readers see either the old file or the
/// complete new one, never a prefix.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = partial_path(path);
    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    debug!("wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}
