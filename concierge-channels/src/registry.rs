//! Phone number to apartment registry for the WhatsApp channel.
//!
//! Stored as one JSON object keyed by phone number and rewritten in full on
//! every change:
//!
//! ```json
//! { "34600111222": { "apartment_id": "apt-1", "guest_name": "Ana", "registered_at": "..." } }
//! ```

use chrono::{DateTime, Utc};
use concierge_common::util::is_safe_path_segment;
use concierge_common::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// One registered guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredGuest {
    pub apartment_id: String,
    #[serde(default)]
    pub guest_name: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// A registry row as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub phone_number: String,
    #[serde(flatten)]
    pub guest: RegisteredGuest,
}

/// File-backed phone registry.
pub struct GuestPhoneRegistry {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, RegisteredGuest>>,
}

impl GuestPhoneRegistry {
    /// Open the registry at `path`. A missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .context(format!("parsing phone registry {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register or re-register a phone number.
    pub fn register_guest(
        &self,
        phone_number: &str,
        apartment_id: &str,
        guest_name: Option<&str>,
    ) -> Result<RegistryEntry> {
        let phone = normalize_phone(phone_number)?;
        let apartment_id = apartment_id.trim();
        if !is_safe_path_segment(apartment_id) {
            return Err(Error::InvalidInput(format!(
                "Invalid apartment id: {apartment_id:?}"
            )));
        }

        let guest = RegisteredGuest {
            apartment_id: apartment_id.to_string(),
            guest_name: guest_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            registered_at: Utc::now(),
        };

        let mut entries = self.entries()?;
        let mut staged = entries.clone();
        staged.insert(phone.clone(), guest.clone());
        self.persist(&staged)?;
        *entries = staged;

        tracing::info!(phone = %phone, apartment_id = %apartment_id, "Guest phone registered");
        Ok(RegistryEntry {
            phone_number: phone,
            guest,
        })
    }

    /// Apartment for a phone number, if registered.
    pub fn get_apartment_id(&self, phone_number: &str) -> Result<Option<String>> {
        let Ok(phone) = normalize_phone(phone_number) else {
            return Ok(None);
        };
        Ok(self
            .entries()?
            .get(&phone)
            .map(|guest| guest.apartment_id.clone()))
    }

    /// Remove a phone number. Returns whether it was registered.
    pub fn unregister_guest(&self, phone_number: &str) -> Result<bool> {
        let phone = normalize_phone(phone_number)?;
        let mut entries = self.entries()?;
        if !entries.contains_key(&phone) {
            return Ok(false);
        }
        let mut staged = entries.clone();
        staged.remove(&phone);
        self.persist(&staged)?;
        *entries = staged;

        tracing::info!(phone = %phone, "Guest phone unregistered");
        Ok(true)
    }

    /// All registrations ordered by phone number.
    pub fn list(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self
            .entries()?
            .iter()
            .map(|(phone, guest)| RegistryEntry {
                phone_number: phone.clone(),
                guest: guest.clone(),
            })
            .collect())
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, RegisteredGuest>>> {
        self.entries
            .lock()
            .map_err(|e| Error::Internal(format!("Lock error: {e}")))
    }

    /// Rewrite the file. The in-memory map is only updated once this succeeds.
    fn persist(&self, entries: &BTreeMap<String, RegisteredGuest>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e).context("saving phone registry");
        }
        Ok(())
    }
}

/// Registry key for a phone number: digits only, without `+`, spaces or dashes.
pub fn normalize_phone(phone_number: &str) -> Result<String> {
    let digits: String = phone_number
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!(
            "Invalid phone number: {phone_number:?}"
        )));
    }
    Ok(digits)
}
