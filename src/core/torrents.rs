//! Torrent directory bookkeeping.
//!
//! Decides whether the torrent client has any work: `.torrent` files waiting
//! in the watch directory or torrents still active. `.added` markers left by
//! the client after picking up a file are cleaned up along the way.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::constants;
use crate::error::{Error, Result};

/// What was found in the torrent directories.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TorrentScan {
    /// `.added` markers that were deleted.
    pub removed_markers: Vec<PathBuf>,
    /// `.torrent` files waiting in the watch directory.
    pub pending: Vec<PathBuf>,
    /// `.torrent` files in the active directory.
    pub active: Vec<PathBuf>,
}

impl TorrentScan {
    /// The client has something to do.
    #[must_use]
    pub fn client_needed(&self) -> bool {
        !self.pending.is_empty() || !self.active.is_empty()
    }
}

/// Regular files in `dir` with extension `ext`, sorted by name.
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Configuration(format!("cannot read {}: {e}", dir.display())))?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(ext))
        .collect();
    files.sort();
    Ok(files)
}

/// Scan both directories and delete stale `.added` markers.
///
/// # Errors
///
/// [`Error::Configuration`] if either directory cannot be read.
pub fn scan(watch_dir: &Path, active_dir: &Path) -> Result<TorrentScan> {
    let markers = files_with_extension(watch_dir, constants::EXT_ADDED)?;
    let mut removed_markers = Vec::with_capacity(markers.len());
    for marker in markers {
        match fs::remove_file(&marker) {
            Ok(()) => removed_markers.push(marker),
            Err(e) => warn!("TORRENTS: cannot delete {}: {e}", marker.display()),
        }
    }
    if !removed_markers.is_empty() {
        info!("TORRENTS: deleted {} added marker(s)", removed_markers.len());
    }

    let pending = files_with_extension(watch_dir, constants::EXT_TORRENT)?;
    let active = files_with_extension(active_dir, constants::EXT_TORRENT)?;
    info!(
        "TORRENTS: {} pending, {} active",
        pending.len(),
        active.len()
    );

    Ok(TorrentScan {
        removed_markers,
        pending,
        active,
    })
}
