use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;

use crate::error::{FinError, Result};
use crate::ledger::check_profile;
use crate::model::{Ledger, Profile, Snapshot};
use crate::saving;

const USERS_FILE: &str = "users.json";
const LEDGER_FILE: &str = "ledger.bin.gz";

/// A registered account as kept in `users.json`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Login identity, unique across users (compared case-insensitively).
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> Profile {
        Profile {
            name: self.name.clone(),
            email: self.email.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// File-backed database: one `users.json` plus a ledger file per user directory.
///
/// All reads and writes go through one mutex. The load, modify, save cycle is
/// short and the data set per user is small.
#[derive(Debug)]
pub struct Database {
    root: PathBuf,
    lock: Mutex<()>,
}

impl Database {
    /// Open (creating if needed) a database rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        create_dir_all(&root)?;

        let users_path = root.join(USERS_FILE);
        if !users_path.exists() {
            fs::write(&users_path, b"{}")?;
            info!("initialised user database at {}", users_path.display());
        }

        Ok(Database {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ledger_path(&self, user_id: &str) -> PathBuf {
        self.root.join(user_id).join(LEDGER_FILE)
    }

    fn read_users(&self) -> Result<BTreeMap<String, User>> {
        let contents = fs::read_to_string(self.root.join(USERS_FILE))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_users(&self, users: &BTreeMap<String, User>) -> Result<()> {
        let json = serde_json::to_string_pretty(users)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(self.root.join(USERS_FILE)).map_err(|e| e.error)?;
        Ok(())
    }

    fn read_ledger(&self, user_id: &str) -> Result<Ledger> {
        let path = self.ledger_path(user_id);
        if !path.exists() {
            warn!("ledger for user {} missing, starting from defaults", user_id);
            return Ok(Ledger::default());
        }
        saving::load_ledger(&path)
    }

    pub fn user(&self, user_id: &str) -> Result<User> {
        let _guard = self.guard();
        self.read_users()?
            .remove(user_id)
            .ok_or_else(|| FinError::not_found("User not found."))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let _guard = self.guard();
        let email = email.trim().to_lowercase();
        Ok(self
            .read_users()?
            .into_values()
            .find(|u| u.email.to_lowercase() == email))
    }

    /// Store a new user together with their starting ledger.
    ///
    /// The ledger is written first; a user record never exists without one.
    pub fn insert_user(&self, user: User, ledger: &Ledger) -> Result<()> {
        let _guard = self.guard();
        let mut users = self.read_users()?;
        let email = user.email.to_lowercase();
        if users.values().any(|u| u.email.to_lowercase() == email) {
            return Err(FinError::Conflict("User with this email already exists.".into()));
        }

        saving::save_ledger(ledger, &self.ledger_path(&user.id))?;
        users.insert(user.id.clone(), user);
        self.write_users(&users)
    }

    /// Apply `change` to a user record and persist it.
    pub fn update_user<F>(&self, user_id: &str, change: F) -> Result<User>
    where
        F: FnOnce(&mut User) -> Result<()>,
    {
        let _guard = self.guard();
        let mut users = self.read_users()?;
        let mut user = users
            .get(user_id)
            .cloned()
            .ok_or_else(|| FinError::not_found("User not found."))?;
        change(&mut user)?;

        let email = user.email.to_lowercase();
        if users
            .values()
            .any(|u| u.id != user.id && u.email.to_lowercase() == email)
        {
            return Err(FinError::Conflict(
                "Email is already taken by another account.".into(),
            ));
        }

        users.insert(user.id.clone(), user.clone());
        self.write_users(&users)?;
        Ok(user)
    }

    pub fn update_profile(
        &self,
        user_id: &str,
        name: &str,
        email: &str,
        avatar: Option<Option<String>>,
    ) -> Result<User> {
        let (name, email) = check_profile(name, email)?;
        self.update_user(user_id, |user| {
            user.name = name;
            user.email = email;
            if let Some(avatar) = avatar {
                user.avatar = avatar;
            }
            Ok(())
        })
    }

    pub fn ledger(&self, user_id: &str) -> Result<Ledger> {
        let _guard = self.guard();
        self.read_ledger(user_id)
    }

    /// Run `change` against a copy of the user's ledger and save it only if
    /// the whole change succeeds.
    pub fn with_ledger<T, F>(&self, user_id: &str, change: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>,
    {
        let _guard = self.guard();
        let mut ledger = self.read_ledger(user_id)?;
        let out = change(&mut ledger)?;
        saving::save_ledger(&ledger, &self.ledger_path(user_id))?;
        Ok(out)
    }

    pub fn replace_ledger(&self, user_id: &str, ledger: &Ledger) -> Result<()> {
        let _guard = self.guard();
        saving::save_ledger(ledger, &self.ledger_path(user_id))
    }

    /// Profile plus ledger, as served by the sync endpoint.
    pub fn snapshot(&self, user_id: &str) -> Result<Snapshot> {
        let _guard = self.guard();
        let user = self
            .read_users()?
            .remove(user_id)
            .ok_or_else(|| FinError::not_found("User not found."))?;
        Ok(Snapshot {
            profile: user.profile(),
            ledger: self.read_ledger(user_id)?,
        })
    }
}
