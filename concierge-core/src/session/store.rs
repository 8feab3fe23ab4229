//! File-backed session storage.
//!
//! Layout under the history directory:
//! - `history/{guest_id}.json`: the guest's full message log
//! - `guests/{guest_id}.json`: the guest → apartment link
//!
//! Writes replace the whole record through a temporary sibling and a rename,
//! so a reader never sees a half-written file. Read-modify-write sequences
//! must hold the guest's lock from [`SessionStore::lock`].

use super::locks::{GuestGuard, GuestLocks};
use super::types::{ChatHistory, ChatMessage, GuestApartmentLink};
use concierge_common::util::is_safe_path_segment;
use concierge_common::{Error, Result, ResultExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const HISTORY_DIR: &str = "history";
const LINKS_DIR: &str = "guests";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Per-guest history and apartment link storage.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    locks: GuestLocks,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: GuestLocks::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Exclusive access to one guest's records.
    pub async fn lock(&self, guest_id: &str) -> GuestGuard {
        self.locks.lock(guest_id).await
    }

    /// Full history, empty when nothing has been saved.
    pub async fn get_history(&self, guest_id: &str) -> Result<ChatHistory> {
        let path = self.history_path(guest_id)?;
        Ok(read_json(&path).await?.unwrap_or_default())
    }

    /// Replace the stored history.
    pub async fn save_history(&self, guest_id: &str, history: &[ChatMessage]) -> Result<()> {
        let path = self.history_path(guest_id)?;
        write_json(&path, &history)
            .await
            .context(format!("saving history for {guest_id}"))
    }

    /// Point a guest at an apartment, replacing any earlier link.
    pub async fn save_link(&self, guest_id: &str, apartment_id: &str) -> Result<GuestApartmentLink> {
        let path = self.link_path(guest_id)?;
        let link = GuestApartmentLink::new(guest_id, apartment_id);
        write_json(&path, &link)
            .await
            .context(format!("saving apartment link for {guest_id}"))?;
        Ok(link)
    }

    pub async fn get_link(&self, guest_id: &str) -> Result<Option<GuestApartmentLink>> {
        let path = self.link_path(guest_id)?;
        read_json(&path).await
    }

    /// Delete the history. The apartment link stays.
    pub async fn reset(&self, guest_id: &str) -> Result<()> {
        let path = self.history_path(guest_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn history_path(&self, guest_id: &str) -> Result<PathBuf> {
        validate_guest_id(guest_id)?;
        Ok(self.dir.join(HISTORY_DIR).join(format!("{guest_id}.json")))
    }

    fn link_path(&self, guest_id: &str) -> Result<PathBuf> {
        validate_guest_id(guest_id)?;
        Ok(self.dir.join(LINKS_DIR).join(format!("{guest_id}.json")))
    }
}

fn validate_guest_id(guest_id: &str) -> Result<()> {
    if is_safe_path_segment(guest_id) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid guest id: {guest_id:?}")))
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .context(format!("parsing {}", path.display()))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let bytes = serde_json::to_vec_pretty(value)?;
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));

    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
