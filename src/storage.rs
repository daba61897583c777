//! Persistence of user-authored ratio definitions.
//!
//! [`CustomRatioStore`] is the raw load/save/clear contract. [`CustomRatioRepository`]
//! layers validation and the add/update/delete operations on top and holds a
//! per-user lock across each read-modify-write, so concurrent writers for the
//! same user cannot lose each other's updates.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{RatioEngineError, Result};
use crate::schema::RatioDefinition;
use crate::settings::EngineSettings;
use crate::validation::validate_custom_ratio;

pub trait CustomRatioStore: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Vec<RatioDefinition>>;
    fn save(&self, user_id: &str, ratios: &[RatioDefinition]) -> Result<()>;
    fn clear(&self, user_id: &str) -> Result<()>;
}

/// Only letters, digits, `-` and `_`, so ids are safe to embed in file names.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    let valid = !user_id.is_empty()
        && user_id.len() <= 128
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RatioEngineError::InvalidUserId(user_id.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageMetadata {
    pub user_id: String,
    pub last_updated: DateTime<Utc>,
    pub count: usize,
}

/// On-disk layout of one user's file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRatios {
    #[serde(default)]
    pub ratios: Vec<RatioDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StorageMetadata>,
}

/// One `<user_id>_ratios.json` file per user under `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the configured `storage_dir`.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.storage_dir.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.dir.join(format!("{}_ratios.json", user_id)))
    }
}

impl CustomRatioStore for JsonFileStore {
    fn load(&self, user_id: &str) -> Result<Vec<RatioDefinition>> {
        let path = self.path_for(user_id)?;
        if !path.exists() {
            debug!("No stored ratios for user '{}'", user_id);
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        let stored: StoredRatios = serde_json::from_str(&contents)?;
        Ok(stored.ratios)
    }

    fn save(&self, user_id: &str, ratios: &[RatioDefinition]) -> Result<()> {
        let path = self.path_for(user_id)?;
        fs::create_dir_all(&self.dir)?;

        let stored = StoredRatios {
            ratios: ratios.to_vec(),
            metadata: Some(StorageMetadata {
                user_id: user_id.to_string(),
                last_updated: Utc::now(),
                count: ratios.len(),
            }),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        // Write then rename so readers never observe a half-written file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved {} ratios for user '{}'", ratios.len(), user_id);
        Ok(())
    }

    fn clear(&self, user_id: &str) -> Result<()> {
        let path = self.path_for(user_id)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<String, Vec<RatioDefinition>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CustomRatioStore for InMemoryStore {
    fn load(&self, user_id: &str) -> Result<Vec<RatioDefinition>> {
        validate_user_id(user_id)?;
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(user_id).cloned().unwrap_or_default())
    }

    fn save(&self, user_id: &str, ratios: &[RatioDefinition]) -> Result<()> {
        validate_user_id(user_id)?;
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.insert(user_id.to_string(), ratios.to_vec());
        Ok(())
    }

    fn clear(&self, user_id: &str) -> Result<()> {
        validate_user_id(user_id)?;
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.remove(user_id);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedRatios {
    ratios: Vec<RatioDefinition>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportPayload {
    Wrapped { ratios: Vec<RatioDefinition> },
    Bare(Vec<RatioDefinition>),
}

fn matches_id(definition: &RatioDefinition, id_or_name: &str) -> bool {
    definition.ratio_key() == id_or_name || definition.name.eq_ignore_ascii_case(id_or_name)
}

/// Normalized copy ready for storage: explicit key, lowercased category.
fn prepare(definition: &RatioDefinition, key: String) -> RatioDefinition {
    RatioDefinition {
        key: Some(key),
        category: definition.category_key(),
        is_base: false,
        ..definition.clone()
    }
}

pub struct CustomRatioRepository<S: CustomRatioStore> {
    store: S,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CustomRatioRepository<JsonFileStore> {
    /// File-backed repository under the configured `storage_dir`.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(JsonFileStore::from_settings(settings))
    }
}

impl<S: CustomRatioStore> CustomRatioRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(user_id.to_string()).or_default().clone()
    }

    /// Drops the user's lock entry when nobody else holds or waits on it.
    /// Clones are only handed out under the map lock, so a count of two
    /// (the map and `held`) cannot change while it is checked.
    fn release_lock(&self, user_id: &str, held: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(held) == 2 {
            locks.remove(user_id);
        }
    }

    /// Number of users with a live lock entry.
    pub fn tracked_users(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Runs a read-modify-write on one user's ratios while holding that user's lock.
    fn modify<T>(
        &self,
        user_id: &str,
        change: impl FnOnce(&mut Vec<RatioDefinition>) -> Result<T>,
    ) -> Result<T> {
        validate_user_id(user_id)?;
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut ratios = self.store.load(user_id)?;
        let outcome = change(&mut ratios);
        let saved = match outcome {
            Ok(_) if ratios.is_empty() => self.store.clear(user_id),
            Ok(_) => self.store.save(user_id, &ratios),
            Err(_) => Ok(()),
        };
        if ratios.is_empty() {
            self.release_lock(user_id, &lock);
        }
        saved?;
        outcome
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<RatioDefinition>> {
        self.store.load(user_id)
    }

    pub fn get(&self, user_id: &str, id_or_name: &str) -> Result<RatioDefinition> {
        self.store
            .load(user_id)?
            .into_iter()
            .find(|r| matches_id(r, id_or_name))
            .ok_or_else(|| RatioEngineError::RatioNotFound(id_or_name.to_string()))
    }

    pub fn add(&self, user_id: &str, definition: &RatioDefinition) -> Result<RatioDefinition> {
        validate_custom_ratio(definition)?;
        let key = definition.ratio_key();

        self.modify(user_id, |ratios| {
            let duplicate = ratios
                .iter()
                .any(|r| r.ratio_key() == key || r.name.eq_ignore_ascii_case(definition.name.trim()));
            if duplicate {
                return Err(RatioEngineError::DuplicateRatio(definition.name.clone()));
            }
            let stored = prepare(definition, key.clone());
            ratios.push(stored.clone());
            info!("Added custom ratio '{}' for user '{}'", key, user_id);
            Ok(stored)
        })
    }

    /// Replaces the ratio matched by key or name. The stored key is kept.
    pub fn update(
        &self,
        user_id: &str,
        id_or_name: &str,
        definition: &RatioDefinition,
    ) -> Result<RatioDefinition> {
        validate_custom_ratio(definition)?;

        self.modify(user_id, |ratios| {
            let index = ratios
                .iter()
                .position(|r| matches_id(r, id_or_name))
                .ok_or_else(|| RatioEngineError::RatioNotFound(id_or_name.to_string()))?;
            let renamed_onto_other = ratios.iter().enumerate().any(|(i, r)| {
                i != index && r.name.eq_ignore_ascii_case(definition.name.trim())
            });
            if renamed_onto_other {
                return Err(RatioEngineError::DuplicateRatio(definition.name.clone()));
            }
            let updated = prepare(definition, ratios[index].ratio_key());
            ratios[index] = updated.clone();
            info!("Updated custom ratio '{}' for user '{}'", id_or_name, user_id);
            Ok(updated)
        })
    }

    pub fn delete(&self, user_id: &str, id_or_name: &str) -> Result<()> {
        self.modify(user_id, |ratios| {
            let before = ratios.len();
            ratios.retain(|r| !matches_id(r, id_or_name));
            if ratios.len() == before {
                return Err(RatioEngineError::RatioNotFound(id_or_name.to_string()));
            }
            info!("Deleted custom ratio '{}' for user '{}'", id_or_name, user_id);
            Ok(())
        })
    }

    pub fn clear(&self, user_id: &str) -> Result<()> {
        validate_user_id(user_id)?;
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let cleared = self.store.clear(user_id);
        self.release_lock(user_id, &lock);
        cleared
    }

    pub fn export_json(&self, user_id: &str) -> Result<String> {
        let ratios = self.store.load(user_id)?;
        Ok(serde_json::to_string_pretty(&ExportedRatios { ratios })?)
    }

    /// Imports `{"ratios": [...]}` or a bare array. With `merge`, names that
    /// already exist are skipped; without it the stored list is replaced.
    /// Invalid definitions are skipped. Returns how many were imported.
    pub fn import_json(&self, user_id: &str, json: &str, merge: bool) -> Result<usize> {
        let incoming = match serde_json::from_str::<ImportPayload>(json)? {
            ImportPayload::Wrapped { ratios } | ImportPayload::Bare(ratios) => ratios,
        };

        self.modify(user_id, |ratios| {
            if !merge {
                ratios.clear();
            }
            let mut imported = 0;
            for definition in &incoming {
                if let Err(e) = validate_custom_ratio(definition) {
                    warn!("Skipping invalid ratio '{}' on import: {}", definition.name, e);
                    continue;
                }
                let key = definition.ratio_key();
                let exists = ratios
                    .iter()
                    .any(|r| r.ratio_key() == key || r.name.eq_ignore_ascii_case(&definition.name));
                if exists {
                    debug!("Skipping existing ratio '{}' on import", definition.name);
                    continue;
                }
                ratios.push(prepare(definition, key));
                imported += 1;
            }
            info!("Imported {} custom ratios for user '{}'", imported, user_id);
            Ok(imported)
        })
    }
}
