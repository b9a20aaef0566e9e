//! Client-side offline cache.
//!
//! Mirrors what a browser keeps in local storage: the auth token, the email of
//! the logged-in user, and one JSON data block per user keyed by that email.
//! Every edit lands here first and is pushed to the server when possible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{FinError, Result};
use crate::ledger::{CategoryInput, GoalInput, GoalPatch, TransactionInput, TransactionPatch, apply_profile};
use crate::model::{Category, CategoryRef, Goal, Kind, Snapshot, Transaction};
use crate::sync::Tombstones;

pub const AUTH_TOKEN_KEY: &str = "finTrackToken";
pub const LOGGED_IN_USER_KEY: &str = "finTrackLoggedInUser";

pub fn user_data_key(email: &str) -> String {
    format!("userData_{}", email)
}

pub fn pending_key(email: &str) -> String {
    format!("pendingSync_{}", email)
}

/// String key/value storage with local-storage semantics.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// A JSON file holding every key, rewritten on each change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(FileStore { path, entries })
    }

    fn flush(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(&self.entries)?.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Local edits not yet acknowledged by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSync {
    pub dirty: bool,
    #[serde(default)]
    pub deleted_transactions: Vec<String>,
    #[serde(default)]
    pub deleted_goals: Vec<String>,
    #[serde(default)]
    pub deleted_categories: Vec<CategoryRef>,
}

impl PendingSync {
    pub fn tombstones(&self) -> Tombstones {
        Tombstones {
            transactions: self.deleted_transactions.clone(),
            goals: self.deleted_goals.clone(),
            categories: self.deleted_categories.clone(),
        }
    }
}

#[derive(Debug)]
pub struct LocalCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> LocalCache<S> {
    pub fn new(store: S) -> Self {
        LocalCache { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn logged_in_user(&self) -> Option<String> {
        self.store.get(LOGGED_IN_USER_KEY).filter(|email| !email.is_empty())
    }

    pub fn token(&self) -> Option<String> {
        self.store.get(AUTH_TOKEN_KEY).filter(|token| !token.is_empty())
    }

    pub fn sign_in(&mut self, email: &str, token: &str) -> Result<()> {
        self.store.set(LOGGED_IN_USER_KEY, email.to_string())?;
        self.store.set(AUTH_TOKEN_KEY, token.to_string())
    }

    /// Forget who is logged in. Cached data blocks stay for the next login.
    pub fn sign_out(&mut self) -> Result<()> {
        self.store.remove(LOGGED_IN_USER_KEY)?;
        self.store.remove(AUTH_TOKEN_KEY)
    }

    fn current_email(&self) -> Result<String> {
        self.logged_in_user()
            .ok_or_else(|| FinError::Unauthorized("Not logged in.".into()))
    }

    /// The logged-in user's data, created with defaults on first access.
    pub fn user_data(&mut self) -> Result<Snapshot> {
        let email = self.current_email()?;
        match self.store.get(&user_data_key(&email)) {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => {
                let snapshot = Snapshot::new("", &email);
                self.save_user_data(&snapshot)?;
                Ok(snapshot)
            }
        }
    }

    pub fn has_user_data(&self, email: &str) -> bool {
        self.store.get(&user_data_key(email)).is_some()
    }

    pub fn save_user_data(&mut self, snapshot: &Snapshot) -> Result<()> {
        let email = self.current_email()?;
        self.store
            .set(&user_data_key(&email), serde_json::to_string(snapshot)?)
    }

    pub fn pending(&self) -> Result<PendingSync> {
        let email = self.current_email()?;
        match self.store.get(&pending_key(&email)) {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(PendingSync::default()),
        }
    }

    fn save_pending(&mut self, pending: &PendingSync) -> Result<()> {
        let email = self.current_email()?;
        self.store
            .set(&pending_key(&email), serde_json::to_string(pending)?)
    }

    /// Overwrite local state with what the server returned and forget pending edits.
    pub fn replace_from_server(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.save_user_data(snapshot)?;
        let email = self.current_email()?;
        self.store.remove(&pending_key(&email))
    }

    /// Apply an edit to the cached data block and mark it for the next push.
    pub fn edit<T, F>(&mut self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Snapshot, &mut PendingSync) -> Result<T>,
    {
        let mut snapshot = self.user_data()?;
        let mut pending = self.pending()?;
        let out = change(&mut snapshot, &mut pending)?;
        pending.dirty = true;
        self.save_user_data(&snapshot)?;
        self.save_pending(&pending)?;
        Ok(out)
    }

    /// Move the data block to a new email and switch the logged-in identity.
    pub fn rename_user(&mut self, new_email: &str) -> Result<()> {
        let old_email = self.current_email()?;
        if old_email == new_email {
            return Ok(());
        }
        let mut snapshot = self.user_data()?;
        snapshot.profile.email = new_email.to_string();
        let pending = self.pending()?;

        self.store.remove(&user_data_key(&old_email))?;
        self.store.remove(&pending_key(&old_email))?;
        self.store.set(LOGGED_IN_USER_KEY, new_email.to_string())?;
        self.save_user_data(&snapshot)?;
        if pending != PendingSync::default() {
            self.save_pending(&pending)?;
        }
        Ok(())
    }

    // Optimistic edits

    pub fn add_transaction(&mut self, input: TransactionInput) -> Result<Transaction> {
        self.edit(|snapshot, _| snapshot.ledger.add_transaction(input))
    }

    pub fn update_transaction(&mut self, id: &str, patch: TransactionPatch) -> Result<Transaction> {
        self.edit(|snapshot, _| snapshot.ledger.update_transaction(id, patch))
    }

    pub fn delete_transaction(&mut self, id: &str) -> Result<()> {
        self.edit(|snapshot, pending| {
            snapshot.ledger.delete_transaction(id)?;
            pending.deleted_transactions.push(id.to_string());
            Ok(())
        })
    }

    pub fn add_category(&mut self, input: CategoryInput) -> Result<Category> {
        self.edit(|snapshot, _| snapshot.ledger.add_category(input))
    }

    pub fn delete_category(&mut self, name: &str, kind: Kind) -> Result<()> {
        self.edit(|snapshot, pending| {
            snapshot.ledger.delete_category(name, kind)?;
            pending.deleted_categories.push(CategoryRef { name: name.trim().to_string(), kind });
            Ok(())
        })
    }

    pub fn set_budget(&mut self, category: &str, amount: f64) -> Result<()> {
        self.edit(|snapshot, _| snapshot.ledger.set_budget(category, amount))
    }

    pub fn delete_budget(&mut self, category: &str) -> Result<()> {
        self.edit(|snapshot, _| snapshot.ledger.delete_budget(category))
    }

    pub fn add_goal(&mut self, input: GoalInput) -> Result<Goal> {
        self.edit(|snapshot, _| snapshot.ledger.add_goal(input))
    }

    pub fn update_goal(&mut self, id: &str, patch: GoalPatch) -> Result<Goal> {
        self.edit(|snapshot, _| snapshot.ledger.update_goal(id, patch))
    }

    pub fn delete_goal(&mut self, id: &str) -> Result<()> {
        self.edit(|snapshot, pending| {
            snapshot.ledger.delete_goal(id)?;
            pending.deleted_goals.push(id.to_string());
            Ok(())
        })
    }

    /// Name and avatar only; the email is the cache key and changes via [`Self::rename_user`].
    pub fn update_profile(&mut self, name: &str, avatar: Option<Option<String>>) -> Result<()> {
        self.edit(|snapshot, _| {
            let email = snapshot.profile.email.clone();
            apply_profile(&mut snapshot.profile, name, &email, avatar)
        })
    }
}
