use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use fintrack::FinError;
use fintrack::auth::Sessions;
use fintrack::cache::{LocalCache, MemoryStore};
use fintrack::client::{LocalTransport, SyncClient};
use fintrack::ledger::{CategoryInput, GoalInput, TransactionInput, TransactionPatch};
use fintrack::model::Kind;
use fintrack::store::Database;

type Client = SyncClient<MemoryStore, LocalTransport>;

struct Server {
    db: Arc<Database>,
    sessions: Arc<Sessions>,
    _dir: TempDir,
}

impl Server {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Server {
            db: Arc::new(Database::open(dir.path()).unwrap()),
            sessions: Arc::new(Sessions::new(Duration::from_secs(60))),
            _dir: dir,
        }
    }

    fn client(&self) -> Client {
        let transport = LocalTransport::new(self.db.clone(), self.sessions.clone());
        SyncClient::new(LocalCache::new(MemoryStore::new()), transport)
    }

    fn transactions(&self, email: &str) -> Vec<String> {
        let user = self.db.find_by_email(email).unwrap().unwrap();
        let mut ids: Vec<String> = self
            .db
            .ledger(&user.id)
            .unwrap()
            .transactions
            .into_iter()
            .map(|tx| tx.id)
            .collect();
        ids.sort();
        ids
    }
}

fn spend(description: &str, amount: f64) -> TransactionInput {
    TransactionInput {
        description: description.into(),
        amount,
        kind: Kind::Expense,
        category: "Food".into(),
        date: NaiveDate::from_ymd_opt(2026, 10, 12).unwrap(),
    }
}

#[tokio::test]
async fn register_logs_in_and_pulls_server_state() {
    let server = Server::start();
    let mut client = server.client();

    let grant = client.register("Ana", "ana@example.com", "secret1").await.unwrap();
    assert_eq!(grant.user.name, "Ana");
    assert_eq!(client.cache().logged_in_user().as_deref(), Some("ana@example.com"));

    let data = client.data().unwrap();
    assert_eq!(data.profile.name, "Ana");
    assert_eq!(data.ledger.categories.len(), 11);
    assert!(!client.cache().pending().unwrap().dirty);
}

#[tokio::test]
async fn online_edits_reach_the_server_immediately() {
    let server = Server::start();
    let mut client = server.client();
    client.register("Ana", "ana@example.com", "secret1").await.unwrap();

    let tx = client
        .record(|cache| cache.add_transaction(spend("Coffee", 25_000.0)))
        .await
        .unwrap();

    assert_eq!(server.transactions("ana@example.com"), vec![tx.id]);
    assert!(!client.cache().pending().unwrap().dirty);
}

#[tokio::test]
async fn offline_edits_are_kept_and_pushed_on_reconnect() {
    let server = Server::start();
    let mut client = server.client();
    client.register("Ana", "ana@example.com", "secret1").await.unwrap();
    let first = client
        .record(|cache| cache.add_transaction(spend("Coffee", 25_000.0)))
        .await
        .unwrap();

    client.transport().set_reachable(false);
    let second = client
        .record(|cache| cache.add_transaction(spend("Groceries", 400_000.0)))
        .await
        .unwrap();
    assert!(!client.is_online());

    client
        .record(|cache| cache.delete_transaction(&first.id))
        .await
        .unwrap();
    client
        .record(|cache| {
            cache.add_goal(GoalInput {
                name: "Trip".into(),
                target_amount: 5_000_000.0,
                current_amount: 0.0,
                target_date: None,
            })
        })
        .await
        .unwrap();

    let pending = client.cache().pending().unwrap();
    assert!(pending.dirty);
    assert_eq!(pending.deleted_transactions, vec![first.id.clone()]);
    assert_eq!(server.transactions("ana@example.com"), vec![first.id.clone()]);

    client.transport().set_reachable(true);
    let report = client.set_online(true).await.unwrap().unwrap();
    assert_eq!(report.deletions, 1);
    assert_eq!(report.pulled_transactions, 1);
    assert_eq!(report.pulled_goals, 1);

    assert_eq!(server.transactions("ana@example.com"), vec![second.id]);
    assert!(client.is_online());
    assert!(!client.cache().pending().unwrap().dirty);
}

#[tokio::test]
async fn deleted_categories_stay_deleted_after_sync() {
    let server = Server::start();
    let mut client = server.client();
    client.register("Ana", "ana@example.com", "secret1").await.unwrap();
    let pets = || CategoryInput { name: "Pets".into(), kind: Kind::Expense, icon_key: None };
    let on_server = |server: &Server| {
        let user = server.db.find_by_email("ana@example.com").unwrap().unwrap();
        server.db.ledger(&user.id).unwrap().category("Pets", Kind::Expense).is_some()
    };

    client.record(|cache| cache.add_category(pets())).await.unwrap();
    assert!(on_server(&server));

    client
        .record(|cache| cache.delete_category("Pets", Kind::Expense))
        .await
        .unwrap();
    assert!(client.data().unwrap().ledger.category("Pets", Kind::Expense).is_none());
    assert!(!on_server(&server));

    // The same holds when the deletion happens offline.
    client.record(|cache| cache.add_category(pets())).await.unwrap();
    client.transport().set_reachable(false);
    client
        .record(|cache| cache.delete_category("pets", Kind::Expense))
        .await
        .unwrap();
    assert!(on_server(&server));

    client.transport().set_reachable(true);
    let report = client.set_online(true).await.unwrap().unwrap();
    assert_eq!(report.deletions, 1);
    assert!(!on_server(&server));
    assert!(client.data().unwrap().ledger.category("Pets", Kind::Expense).is_none());
}

#[tokio::test]
async fn going_back_online_without_a_session_does_not_sync() {
    let server = Server::start();
    let mut client = server.client();
    client.set_online(false).await.unwrap();
    assert!(client.set_online(true).await.unwrap().is_none());
}

#[tokio::test]
async fn offline_work_survives_a_logout_and_is_pushed_at_login() {
    let server = Server::start();
    let mut client = server.client();
    client.register("Ana", "ana@example.com", "secret1").await.unwrap();

    client.set_online(false).await.unwrap();
    let tx = client
        .record(|cache| cache.add_transaction(spend("Bakso", 30_000.0)))
        .await
        .unwrap();
    client.logout().await.unwrap();
    assert_eq!(client.cache().token(), None);

    client.set_online(true).await.unwrap();
    client.login("ana@example.com", "secret1").await.unwrap();
    assert_eq!(server.transactions("ana@example.com"), vec![tx.id]);
}

#[tokio::test]
async fn last_write_wins_between_devices() {
    let server = Server::start();
    let mut phone = server.client();
    let mut laptop = server.client();
    phone.register("Ana", "ana@example.com", "secret1").await.unwrap();
    laptop.login("ana@example.com", "secret1").await.unwrap();

    let tx = phone
        .record(|cache| cache.add_transaction(spend("Coffee", 25_000.0)))
        .await
        .unwrap();
    laptop.pull().await.unwrap();

    phone.transport().set_reachable(false);
    phone
        .record(|cache| cache.update_transaction(&tx.id, spend("Coffee", 30_000.0).into()))
        .await
        .unwrap();
    laptop
        .record(|cache| {
            let patch = TransactionPatch { amount: Some(45_000.0), ..TransactionPatch::default() };
            cache.update_transaction(&tx.id, patch)
        })
        .await
        .unwrap();

    // The phone syncs last, so its amount is what everyone ends up with.
    phone.transport().set_reachable(true);
    phone.set_online(true).await.unwrap();
    laptop.pull().await.unwrap();

    let amount = |client: &mut Client| client.data().unwrap().ledger.transaction(&tx.id).unwrap().amount;
    assert_eq!(amount(&mut phone), 30_000.0);
    assert_eq!(amount(&mut laptop), 30_000.0);
}

#[tokio::test]
async fn email_change_needs_the_server() {
    let server = Server::start();
    let mut client = server.client();
    client.register("Ana", "ana@example.com", "secret1").await.unwrap();

    client.set_online(false).await.unwrap();
    assert!(matches!(
        client.change_email("ana@new.example").await,
        Err(FinError::Offline)
    ));

    client.set_online(true).await.unwrap();
    let profile = client.change_email("ana@new.example").await.unwrap();
    assert_eq!(profile.email, "ana@new.example");
    assert_eq!(client.cache().logged_in_user().as_deref(), Some("ana@new.example"));
    assert!(!client.cache().has_user_data("ana@example.com"));
    assert!(server.db.find_by_email("ana@new.example").unwrap().is_some());
}

#[tokio::test]
async fn rejected_credentials_leave_the_client_online() {
    let server = Server::start();
    let mut client = server.client();
    client.register("Ana", "ana@example.com", "secret1").await.unwrap();
    client.logout().await.unwrap();

    let err = client.login("ana@example.com", "nope!!").await.unwrap_err();
    assert!(matches!(err, FinError::Unauthorized(_)));
    assert!(client.is_online());
    assert_eq!(client.cache().token(), None);
}
