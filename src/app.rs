use axum::{
    Extension, Json, Router,
    body::{Body, Bytes},
    extract::{Multipart, Path, Query, Request, State},
    http::{HeaderMap, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Datelike, Local, NaiveDate};
use log::info;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::auth::{self, Credentials, PasswordChange, ProfileUpdate, Registration, Sessions};
use crate::config::Config;
use crate::downloader;
use crate::error::{FinError, Result};
use crate::ledger::{CategoryInput, GoalInput, GoalPatch, TransactionInput, TransactionPatch};
use crate::model::Kind;
use crate::saving;
use crate::store::Database;
use crate::summary;
use crate::sync::{SyncPush, apply_push};

const SESSION_COOKIE: &str = "session";

pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: Arc<Sessions>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let db = Database::open(&config.data_dir)?;
        Ok(AppState {
            db: Arc::new(db),
            sessions: Arc::new(Sessions::new(config.session_ttl)),
            config,
        })
    }
}

/// Who made the request, as established by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub token: String,
}

#[derive(Deserialize)]
struct DashboardQuery {
    year: Option<i32>,
    month: Option<u32>,
}

#[derive(Deserialize)]
struct BudgetAmount {
    amount: f64,
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = config.addr;
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("FinTrack API listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/profile", get(get_profile).post(update_profile).put(update_profile))
        .route("/api/profile/password", post(change_password))
        .route("/api/data/sync", get(pull).post(push))
        .route("/api/transactions", get(list_transactions).post(add_transaction))
        .route("/api/transactions/:id", put(update_transaction).delete(delete_transaction))
        .route("/api/categories", get(list_categories).post(add_category))
        .route("/api/categories/:kind/:name", delete(delete_category))
        .route("/api/budgets", get(list_budgets))
        .route("/api/budgets/:category", put(set_budget).delete(delete_budget))
        .route("/api/goals", get(list_goals).post(add_goal))
        .route("/api/goals/:id", put(update_goal).delete(delete_goal))
        .route("/api/dashboard", get(dashboard))
        .route("/api/export/transactions.csv", get(export_csv))
        .route("/api/import/transactions", post(import_csv))
        .route("/api/export/ledger", get(export_ledger))
        .route("/api/import/ledger", post(import_ledger))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Accepts `Authorization: Bearer <token>` or the `session` cookie.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers())
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()));

    let Some(token) = token else {
        return FinError::Unauthorized("Access denied. No token provided.".into()).into_response();
    };
    match state.sessions.validate(&token) {
        Some(id) => {
            request.extensions_mut().insert(CurrentUser { id, token });
            next.run(request).await
        }
        None => FinError::Unauthorized("Access denied. Invalid token.".into()).into_response(),
    }
}

// Auth and profile

async fn register(
    State(state): State<Arc<AppState>>,
    Json(form): Json<Registration>,
) -> Result<impl IntoResponse> {
    auth::register(&state.db, &form)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User was successfully registered." })),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<Credentials>,
) -> Result<impl IntoResponse> {
    let grant = auth::login(&state.db, &state.sessions, &form)?;
    let cookie = Cookie::build((SESSION_COOKIE, grant.token.clone()))
        .path("/")
        .http_only(true);
    Ok((jar.add(cookie), Json(grant)))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> impl IntoResponse {
    state.sessions.revoke(&user.token);
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(json!({ "message": "Logged out." })),
    )
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.db.user(&user.id)?.profile()))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse> {
    let updated = state
        .db
        .update_profile(&user.id, &update.name, &update.email, update.avatar)?;
    Ok(Json(json!({
        "message": "Profile updated successfully.",
        "profile": updated.profile(),
    })))
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(change): Json<PasswordChange>,
) -> Result<impl IntoResponse> {
    auth::change_password(&state.db, &user.id, &change)?;
    state.sessions.revoke_user(&user.id);
    Ok(Json(json!({ "message": "Password changed. Please log in again." })))
}

// Sync

async fn pull(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.db.snapshot(&user.id)?))
}

async fn push(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<SyncPush>,
) -> Result<impl IntoResponse> {
    apply_push(&state.db, &user.id, &body)?;
    Ok(Json(json!({ "message": "Sync successful." })))
}

// Transactions

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse> {
    let mut transactions = state.db.ledger(&user.id)?.transactions;
    transactions.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(Json(transactions))
}

async fn add_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<TransactionInput>,
) -> Result<impl IntoResponse> {
    let tx = state.db.with_ledger(&user.id, |l| l.add_transaction(input))?;
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(patch): Json<TransactionPatch>,
) -> Result<impl IntoResponse> {
    let tx = state
        .db
        .with_ledger(&user.id, |l| l.update_transaction(&id, patch))?;
    Ok(Json(tx))
}

async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.db.with_ledger(&user.id, |l| l.delete_transaction(&id))?;
    Ok(StatusCode::NO_CONTENT)
}

// Categories

async fn list_categories(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.db.ledger(&user.id)?.categories))
}

async fn add_category(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<CategoryInput>,
) -> Result<impl IntoResponse> {
    let category = state.db.with_ledger(&user.id, |l| l.add_category(input))?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let kind: Kind = kind.parse()?;
    state
        .db
        .with_ledger(&user.id, |l| l.delete_category(&name, kind))?;
    Ok(StatusCode::NO_CONTENT)
}

// Budgets

async fn list_budgets(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse> {
    let ledger = state.db.ledger(&user.id)?;
    Ok(Json(json!({
        "budgets": ledger.budgets,
        "categories": ledger.expense_categories_for_budgeting(),
    })))
}

async fn set_budget(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(category): Path<String>,
    Json(body): Json<BudgetAmount>,
) -> Result<impl IntoResponse> {
    let budgets = state.db.with_ledger(&user.id, |l| {
        l.set_budget(&category, body.amount)?;
        Ok(l.budgets.clone())
    })?;
    Ok(Json(budgets))
}

async fn delete_budget(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(category): Path<String>,
) -> Result<impl IntoResponse> {
    state.db.with_ledger(&user.id, |l| l.delete_budget(&category))?;
    Ok(StatusCode::NO_CONTENT)
}

// Goals

async fn list_goals(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.db.ledger(&user.id)?.goals))
}

async fn add_goal(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<GoalInput>,
) -> Result<impl IntoResponse> {
    let goal = state.db.with_ledger(&user.id, |l| l.add_goal(input))?;
    Ok((StatusCode::CREATED, Json(goal)))
}

async fn update_goal(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(patch): Json<GoalPatch>,
) -> Result<impl IntoResponse> {
    let goal = state.db.with_ledger(&user.id, |l| l.update_goal(&id, patch))?;
    Ok(Json(goal))
}

async fn delete_goal(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.db.with_ledger(&user.id, |l| l.delete_goal(&id))?;
    Ok(StatusCode::NO_CONTENT)
}

// Dashboard

/// The day figures are computed for: today for the current month, otherwise
/// the last day of the requested month.
fn reference_day(year: Option<i32>, month: Option<u32>, today: NaiveDate) -> Result<NaiveDate> {
    let (year, month) = match (year, month) {
        (None, None) => return Ok(today),
        (Some(year), Some(month)) => (year, month),
        _ => return Err(FinError::validation("Provide both year and month.")),
    };
    if (year, month) == (today.year(), today.month()) {
        return Ok(today);
    }
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|_| {
            let (next_year, next_month) = summary::shift_month(year, month, 1);
            NaiveDate::from_ymd_opt(next_year, next_month, 1)
        })
        .and_then(|first| first.pred_opt())
        .ok_or_else(|| FinError::validation(format!("Invalid month {}-{}.", year, month)))
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse> {
    let day = reference_day(query.year, query.month, Local::now().date_naive())?;
    let ledger = state.db.ledger(&user.id)?;
    Ok(Json(summary::dashboard(&ledger, day)))
}

// Import / export

async fn export_csv(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Response> {
    let ledger = state.db.ledger(&user.id)?;
    let csv = downloader::to_csv(&ledger.transactions)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"transactions.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

async fn import_csv(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let imported = state
        .db
        .with_ledger(&user.id, |l| downloader::import_into(l, &body))?;
    info!("imported {} transactions for {}", imported, user.id);
    Ok(Json(json!({
        "message": "Import successful.",
        "imported": imported,
    })))
}

async fn export_ledger(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Response> {
    let ledger = state.db.ledger(&user.id)?;
    let bytes = saving::encode_ledger(&ledger)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"ledger.bin.gz\"",
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Restore a backup uploaded as the `ledger` field of a multipart form.
async fn import_ledger(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FinError::validation(e.body_text()))?
    {
        if field.name() == Some("ledger") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| FinError::validation(e.body_text()))?;
            data = Some(bytes);
        }
    }

    let data = data
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| FinError::validation("No file data received."))?;
    let ledger = saving::decode_ledger(&data)
        .map_err(|e| FinError::validation(format!("Failed to load ledger: {}", e)))?;
    ledger.validate()?;
    state.db.replace_ledger(&user.id, &ledger)?;

    Ok(Json(json!({
        "message": "Ledger restored.",
        "transactions": ledger.transactions.len(),
        "goals": ledger.goals.len(),
    })))
}
