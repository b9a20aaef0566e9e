use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{FinError, Result};
use crate::model::{Ledger, Profile, is_valid_email, new_id};
use crate::store::{Database, User};

const MIN_PASSWORD_LEN: usize = 6;

/// Registration form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Account details form. `avatar` may be omitted (keep) or null (remove).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "crate::model::present", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Option<String>>,
}

/// What a successful login hands back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub message: String,
    pub token: String,
    /// Unix seconds.
    pub expires_in: u64,
    pub user: Profile,
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub expires_at: SystemTime,
}

/// In-memory session table keyed by opaque bearer token.
#[derive(Debug)]
pub struct Sessions {
    ttl: Duration,
    map: RwLock<HashMap<String, Session>>,
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Sessions {
            ttl,
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session, dropping any that already expired.
    pub fn create(&self, user_id: &str) -> (String, SystemTime) {
        let token = Uuid::new_v4().to_string();
        let now = SystemTime::now();
        let expires_at = now + self.ttl;

        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, s| s.expires_at > now);
        map.insert(
            token.clone(),
            Session {
                user_id: user_id.to_string(),
                expires_at,
            },
        );

        (token, expires_at)
    }

    /// The user behind a live token.
    pub fn validate(&self, token: &str) -> Option<String> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        map.get(token)
            .filter(|s| s.expires_at > SystemTime::now())
            .map(|s| s.user_id.clone())
    }

    pub fn revoke(&self, token: &str) -> bool {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(token).is_some()
    }

    /// Drop every session of one user, e.g. after a password change.
    pub fn revoke_user(&self, user_id: &str) {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, s| s.user_id != user_id);
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| FinError::validation("Password hashing failed."))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Create an account with the default categories and budgets.
pub fn register(db: &Database, form: &Registration) -> Result<User> {
    let name = form.name.trim();
    let email = form.email.trim();
    if name.is_empty() || email.is_empty() || form.password.is_empty() {
        return Err(FinError::validation(
            "Incomplete data. Please provide name, email, and password.",
        ));
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(FinError::validation(
            "Password must be at least 6 characters long.",
        ));
    }
    if !is_valid_email(email) {
        return Err(FinError::validation("Please enter a valid email address."));
    }

    let user = User {
        id: new_id(),
        name: name.to_string(),
        email: email.to_string(),
        password_hash: hash_password(&form.password)?,
        avatar: None,
        created_at: Utc::now(),
    };
    db.insert_user(user.clone(), &Ledger::default())?;
    info!("registered user {} ({})", user.id, user.email);
    Ok(user)
}

/// Check credentials and open a session.
pub fn login(db: &Database, sessions: &Sessions, form: &Credentials) -> Result<LoginGrant> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(FinError::validation("Incomplete data."));
    }

    let user = match db.find_by_email(&form.email)? {
        Some(user) => user,
        None => {
            warn!("login for unknown email {}", form.email.trim());
            return Err(FinError::Unauthorized("Login failed. User not found.".into()));
        }
    };
    if !verify_password(&form.password, &user.password_hash) {
        warn!("bad password for user {}", user.id);
        return Err(FinError::Unauthorized(
            "Login failed. Invalid credentials.".into(),
        ));
    }

    let (token, expires_at) = sessions.create(&user.id);
    let expires_in = expires_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    Ok(LoginGrant {
        message: "Successful login.".into(),
        token,
        expires_in,
        user: user.profile(),
    })
}

pub fn change_password(db: &Database, user_id: &str, change: &PasswordChange) -> Result<()> {
    if change.new_password != change.confirm_password {
        return Err(FinError::validation("New passwords don't match."));
    }
    if change.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(FinError::validation(
            "Password must be at least 6 characters long.",
        ));
    }
    let new_hash = hash_password(&change.new_password)?;

    db.update_user(user_id, |user| {
        if !verify_password(&change.old_password, &user.password_hash) {
            return Err(FinError::validation("Invalid old password."));
        }
        user.password_hash = new_hash;
        Ok(())
    })?;
    Ok(())
}
