//! Offline-first client: edits hit the [`LocalCache`] immediately and are
//! pushed to the server whenever it is reachable.
//!
//! Synchronisation is deliberately naive. A sync pushes the whole local
//! snapshot (plus deletions made since the last sync), then pulls the server
//! state and overwrites the cache with it. The last writer wins.

use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::auth::{self, Credentials, LoginGrant, ProfileUpdate, Registration, Sessions};
use crate::cache::{KeyValueStore, LocalCache};
use crate::error::{FinError, Result};
use crate::model::{Profile, Snapshot};
use crate::store::Database;
use crate::sync::{SyncPush, apply_push};

/// How the client reaches the API.
pub trait SyncTransport {
    fn register(&self, form: &Registration) -> impl Future<Output = Result<()>>;
    fn login(&self, form: &Credentials) -> impl Future<Output = Result<LoginGrant>>;
    fn logout(&self, token: &str) -> impl Future<Output = Result<()>>;
    fn pull(&self, token: &str) -> impl Future<Output = Result<Snapshot>>;
    fn push(&self, token: &str, push: &SyncPush) -> impl Future<Output = Result<()>>;
    fn update_profile(&self, token: &str, update: &ProfileUpdate) -> impl Future<Output = Result<Profile>>;
}

/// Talks to a [`Database`] in the same process. Handy for tests and for
/// embedding the client next to the server.
#[derive(Debug)]
pub struct LocalTransport {
    db: Arc<Database>,
    sessions: Arc<Sessions>,
    reachable: AtomicBool,
}

impl LocalTransport {
    pub fn new(db: Arc<Database>, sessions: Arc<Sessions>) -> Self {
        LocalTransport {
            db,
            sessions,
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the network.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FinError::Transport("connection refused".into()))
        }
    }

    fn user_for(&self, token: &str) -> Result<String> {
        self.check()?;
        self.sessions
            .validate(token)
            .ok_or_else(|| FinError::Unauthorized("Access denied. Invalid token.".into()))
    }
}

impl SyncTransport for LocalTransport {
    async fn register(&self, form: &Registration) -> Result<()> {
        self.check()?;
        auth::register(&self.db, form).map(|_| ())
    }

    async fn login(&self, form: &Credentials) -> Result<LoginGrant> {
        self.check()?;
        auth::login(&self.db, &self.sessions, form)
    }

    async fn logout(&self, token: &str) -> Result<()> {
        self.check()?;
        self.sessions.revoke(token);
        Ok(())
    }

    async fn pull(&self, token: &str) -> Result<Snapshot> {
        let user_id = self.user_for(token)?;
        self.db.snapshot(&user_id)
    }

    async fn push(&self, token: &str, push: &SyncPush) -> Result<()> {
        let user_id = self.user_for(token)?;
        apply_push(&self.db, &user_id, push)
    }

    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<Profile> {
        let user_id = self.user_for(token)?;
        self.db
            .update_profile(&user_id, &update.name, &update.email, update.avatar.clone())
            .map(|user| user.profile())
    }
}

#[cfg(feature = "web")]
pub use http::HttpTransport;

#[cfg(feature = "web")]
mod http {
    use super::SyncTransport;
    use crate::auth::{Credentials, LoginGrant, ProfileUpdate, Registration};
    use crate::error::{FinError, Result};
    use crate::model::{Profile, Snapshot};
    use crate::sync::SyncPush;
    use reqwest::{Client, RequestBuilder, Response};
    use serde::Deserialize;

    /// JSON over HTTP against a running `fintrack-server`.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: Client,
        base: String,
    }

    #[derive(Deserialize)]
    struct ProfileReply {
        profile: Profile,
    }

    impl HttpTransport {
        /// `base_url` is the API root, e.g. `http://127.0.0.1:3000/api`.
        pub fn new(base_url: &str) -> Self {
            HttpTransport {
                client: Client::new(),
                base: base_url.trim_end_matches('/').to_string(),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn send(&self, request: RequestBuilder) -> Result<Response> {
            let response = request
                .send()
                .await
                .map_err(|e| FinError::Transport(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| status.to_string());

            Err(match status.as_u16() {
                400 => FinError::Validation(message),
                401 => FinError::Unauthorized(message),
                404 => FinError::NotFound(message),
                409 => FinError::Conflict(message),
                _ => FinError::Transport(format!("{}: {}", status, message)),
            })
        }

        async fn read<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T> {
            response
                .json::<T>()
                .await
                .map_err(|e| FinError::Transport(format!("unexpected response body: {}", e)))
        }
    }

    impl SyncTransport for HttpTransport {
        async fn register(&self, form: &Registration) -> Result<()> {
            self.send(self.client.post(self.url("/auth/register")).json(form))
                .await?;
            Ok(())
        }

        async fn login(&self, form: &Credentials) -> Result<LoginGrant> {
            let response = self
                .send(self.client.post(self.url("/auth/login")).json(form))
                .await?;
            Self::read(response).await
        }

        async fn logout(&self, token: &str) -> Result<()> {
            self.send(self.client.post(self.url("/auth/logout")).bearer_auth(token))
                .await?;
            Ok(())
        }

        async fn pull(&self, token: &str) -> Result<Snapshot> {
            let response = self
                .send(self.client.get(self.url("/data/sync")).bearer_auth(token))
                .await?;
            Self::read(response).await
        }

        async fn push(&self, token: &str, push: &SyncPush) -> Result<()> {
            self.send(
                self.client
                    .post(self.url("/data/sync"))
                    .bearer_auth(token)
                    .json(push),
            )
            .await?;
            Ok(())
        }

        async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<Profile> {
            let response = self
                .send(
                    self.client
                        .post(self.url("/profile"))
                        .bearer_auth(token)
                        .json(update),
                )
                .await?;
            let reply: ProfileReply = Self::read(response).await?;
            Ok(reply.profile)
        }
    }
}

/// What a completed sync moved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub pushed_transactions: usize,
    pub pushed_goals: usize,
    pub deletions: usize,
    pub pulled_transactions: usize,
    pub pulled_goals: usize,
}

pub struct SyncClient<S: KeyValueStore, T: SyncTransport> {
    cache: LocalCache<S>,
    transport: T,
    online: bool,
}

impl<S: KeyValueStore, T: SyncTransport> SyncClient<S, T> {
    pub fn new(cache: LocalCache<S>, transport: T) -> Self {
        SyncClient {
            cache,
            transport,
            online: true,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn cache(&self) -> &LocalCache<S> {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The logged-in user's cached data.
    pub fn data(&mut self) -> Result<Snapshot> {
        self.cache.user_data()
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online { Ok(()) } else { Err(FinError::Offline) }
    }

    fn token(&self) -> Result<String> {
        self.cache
            .token()
            .ok_or_else(|| FinError::Unauthorized("Not logged in.".into()))
    }

    // Lost connectivity flips the client offline; other errors pass through.
    fn note_failure(&mut self, err: FinError) -> FinError {
        if err.is_connectivity() && self.online {
            warn!("server unreachable, switching to offline mode: {}", err);
            self.online = false;
        }
        err
    }

    pub async fn register(&mut self, name: &str, email: &str, password: &str) -> Result<LoginGrant> {
        self.ensure_online()?;
        let form = Registration {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        if let Err(err) = self.transport.register(&form).await {
            return Err(self.note_failure(err));
        }
        self.login(email, password).await
    }

    /// Log in and bring the cache up to date. Pending offline edits for this
    /// user are pushed before the server copy replaces the local one.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<LoginGrant> {
        self.ensure_online()?;
        let form = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let grant = match self.transport.login(&form).await {
            Ok(grant) => grant,
            Err(err) => return Err(self.note_failure(err)),
        };
        self.cache.sign_in(&grant.user.email, &grant.token)?;

        if self.cache.pending()?.dirty {
            self.synchronize().await?;
        } else {
            self.pull().await?;
        }
        info!("logged in as {}", grant.user.email);
        Ok(grant)
    }

    pub async fn logout(&mut self) -> Result<()> {
        if let (true, Some(token)) = (self.online, self.cache.token()) {
            if let Err(err) = self.transport.logout(&token).await {
                warn!("server logout failed: {}", err);
                self.note_failure(err);
            }
        }
        self.cache.sign_out()
    }

    /// Record a connectivity change. Coming back online triggers a sync.
    pub async fn set_online(&mut self, online: bool) -> Result<Option<SyncReport>> {
        let was_online = self.online;
        self.online = online;
        if online && !was_online && self.cache.token().is_some() {
            return self.synchronize().await.map(Some);
        }
        Ok(None)
    }

    /// Overwrite the cache with the server copy.
    pub async fn pull(&mut self) -> Result<Snapshot> {
        self.ensure_online()?;
        let token = self.token()?;
        let snapshot = match self.transport.pull(&token).await {
            Ok(snapshot) => snapshot,
            Err(err) => return Err(self.note_failure(err)),
        };
        self.cache.replace_from_server(&snapshot)?;
        Ok(snapshot)
    }

    /// Push everything local, then adopt the server's merged state.
    pub async fn synchronize(&mut self) -> Result<SyncReport> {
        self.ensure_online()?;
        let token = self.token()?;
        let snapshot = self.cache.user_data()?;
        let pending = self.cache.pending()?;

        let deleted = pending.tombstones();
        let deletions = deleted.len();
        let push = SyncPush::full(&snapshot, deleted);
        if let Err(err) = self.transport.push(&token, &push).await {
            return Err(self.note_failure(err));
        }
        let merged = self.pull().await?;

        let report = SyncReport {
            pushed_transactions: snapshot.ledger.transactions.len(),
            pushed_goals: snapshot.ledger.goals.len(),
            deletions,
            pulled_transactions: merged.ledger.transactions.len(),
            pulled_goals: merged.ledger.goals.len(),
        };
        info!("sync complete: {:?}", report);
        Ok(report)
    }

    /// Apply an edit optimistically. The edit stands even when the push
    /// fails; it stays pending until the next successful sync.
    pub async fn record<R, F>(&mut self, change: F) -> Result<R>
    where
        F: FnOnce(&mut LocalCache<S>) -> Result<R>,
    {
        let out = change(&mut self.cache)?;
        if self.online && self.cache.token().is_some() {
            if let Err(err) = self.synchronize().await {
                warn!("change kept locally, sync deferred: {}", err);
            }
        }
        Ok(out)
    }

    /// Change the login email on the server, then re-key the local cache.
    pub async fn change_email(&mut self, new_email: &str) -> Result<Profile> {
        self.ensure_online()?;
        let token = self.token()?;
        let current = self.cache.user_data()?.profile;
        let update = ProfileUpdate {
            name: current.name,
            email: new_email.to_string(),
            avatar: Some(current.avatar),
        };
        let profile = match self.transport.update_profile(&token, &update).await {
            Ok(profile) => profile,
            Err(err) => return Err(self.note_failure(err)),
        };
        self.cache.rename_user(&profile.email)?;
        Ok(profile)
    }
}
