use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const ORDER_FILES_DIR: &str = "order_files";

/// A file uploaded along with an order.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Uploaded files on the local filesystem, addressed by paths relative to
/// the media root.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MediaStorage { root: root.into() }
    }

    /// Writes an order attachment and returns its relative path.
    pub async fn save_order_file(&self, attachment: &Attachment) -> std::io::Result<String> {
        let dir = self.root.join(ORDER_FILES_DIR);
        fs::create_dir_all(&dir).await?;
        let name = format!("{}_{}", Uuid::new_v4().simple(), sanitize(&attachment.filename));
        write_whole(&dir.join(&name), &attachment.content).await?;
        let relative = format!("{}/{}", ORDER_FILES_DIR, name);
        debug!("Stored order attachment at {}", relative);
        Ok(relative)
    }

    pub async fn remove(&self, relative: &str) {
        if let Err(e) = fs::remove_file(self.root.join(relative)).await {
            warn!("Failed to remove media file {}: {}", relative, e);
        }
    }
}

/// Writes `content` next to `path` and renames it into place, so a failed
/// write never leaves a partial file under the final name.
async fn write_whole(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = match fs::write(&partial, content).await {
        Ok(()) => fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&partial).await {
            debug!("Nothing to clean up at {}: {}", partial.display(), cleanup);
        }
        return Err(e);
    }
    Ok(())
}

/// Keeps the last path component and replaces anything outside
/// `[A-Za-z0-9._-]` so client filenames cannot escape the media root.
fn sanitize(filename: &str) -> String {
    let base = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
