//! In-process marketplace backend for client tests.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{Value, json};

pub(crate) const PASSWORD: &str = "secret";
pub(crate) const REFRESH_TOKEN: &str = "refresh-1";

pub(crate) struct BackendState {
    pub user: Value,
    pub access_tokens: Vec<String>,
    pub refresh_token: String,
    pub issued: u32,
    pub refresh_delay: Duration,
    pub refresh_calls: u32,
    pub logout_calls: u32,
    /// Canned answer for `GET /api/users/me`, bypassing token checks.
    pub me_response: Option<(StatusCode, String)>,
}

#[derive(Clone)]
pub(crate) struct Backend {
    state: Arc<Mutex<BackendState>>,
}

impl Backend {
    pub(crate) fn new(user: Value) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                user,
                access_tokens: Vec::new(),
                refresh_token: REFRESH_TOKEN.to_owned(),
                issued: 0,
                refresh_delay: Duration::ZERO,
                refresh_calls: 0,
                logout_calls: 0,
                me_response: None,
            })),
        }
    }

    pub(crate) fn with<T>(&self, f: impl FnOnce(&mut BackendState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Mint an access token the backend will accept.
    pub(crate) fn issue_access(&self) -> String {
        self.with(|s| {
            s.issued += 1;
            let token = format!("access-{}", s.issued);
            s.access_tokens.push(token.clone());
            token
        })
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default();
        self.with(|s| s.access_tokens.iter().any(|t| t == token))
    }

    fn auth_body(&self) -> Value {
        let access_token = self.issue_access();
        self.with(|s| json!({ "access_token": access_token, "refresh_token": s.refresh_token, "user": s.user }))
    }
}

pub(crate) fn user_json(id: u64, verified: bool, mitid_verified: bool) -> Value {
    json!({
        "id": id,
        "email": format!("user{id}@example.com"),
        "first_name": "Freja",
        "verified": verified,
        "mitid_verified": mitid_verified,
        "account_level": "legacy"
    })
}

/// Serve `backend` on an ephemeral port and return its base URL.
pub(crate) async fn spawn(backend: Backend) -> String {
    let app = Router::new()
        .route("/api/users/login", post(login))
        .route("/api/users/register", post(register))
        .route("/api/users/token/refresh", post(refresh))
        .route("/api/users/logout", post(logout))
        .route("/api/users/me", get(me).patch(update_me))
        .route("/api/users/mitid/start", post(mitid_start))
        .route("/api/publications", get(publications).post(create_publication))
        .route("/sales", get(sales))
        .route("/payments", get(payments))
        .route("/payments/wallet", get(wallet))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "invalid token" }))).into_response()
}

async fn login(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    if body["password"] != PASSWORD {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad credentials" }))).into_response();
    }
    Json(backend.auth_body()).into_response()
}

async fn register(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.with(|s| {
        s.user = json!({
            "id": 7,
            "email": body["email"],
            "first_name": body["first_name"],
            "verified": false,
            "mitid_verified": false
        });
    });
    (StatusCode::CREATED, Json(backend.auth_body())).into_response()
}

async fn refresh(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    let (expected, delay) = backend.with(|s| {
        s.refresh_calls += 1;
        (s.refresh_token.clone(), s.refresh_delay)
    });
    tokio::time::sleep(delay).await;
    if body["refresh_token"] != expected.as_str() {
        return unauthorized();
    }
    let access_token = backend.issue_access();
    // Refresh answers without rotating the refresh token.
    let user = backend.with(|s| s.user.clone());
    Json(json!({ "access": access_token, "user": user })).into_response()
}

async fn logout(State(backend): State<Backend>) -> StatusCode {
    backend.with(|s| s.logout_calls += 1);
    StatusCode::NO_CONTENT
}

async fn me(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if let Some((status, body)) = backend.with(|s| s.me_response.clone()) {
        return (status, body).into_response();
    }
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(backend.with(|s| s.user.clone())).into_response()
}

async fn update_me(State(backend): State<Backend>, headers: HeaderMap, Json(patch): Json<Value>) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let user = backend.with(|s| {
        if let (Some(user), Some(patch)) = (s.user.as_object_mut(), patch.as_object()) {
            for (key, value) in patch {
                user.insert(key.clone(), value.clone());
            }
        }
        s.user.clone()
    });
    Json(user).into_response()
}

async fn mitid_start(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let return_to = body["return_to"].as_str().unwrap_or_default();
    Json(json!({ "redirect_url": format!("https://mitid.example/start?return_to={return_to}") })).into_response()
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Option<String>,
}

async fn publications(Query(query): Query<SearchQuery>) -> Json<Value> {
    let all = [
        json!({ "id": 1, "title": "Road bike", "price": 2500.0, "currency": "DKK" }),
        json!({ "id": 2, "title": "Sofa", "price": 900.0 }),
    ];
    let results: Vec<Value> = all
        .into_iter()
        .filter(|p| {
            query.search.as_deref().is_none_or(|needle| {
                p["title"]
                    .as_str()
                    .is_some_and(|t| t.to_lowercase().contains(&needle.to_lowercase()))
            })
        })
        .collect();
    Json(json!({ "count": results.len(), "results": results }))
}

async fn create_publication(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::CREATED,
        Json(json!({ "id": "99", "title": body["title"], "price": body["price"], "status": "draft" })),
    )
        .into_response()
}

async fn sales(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([{ "id": 10, "publication_title": "Sofa", "amount": 900.0, "status": "completed" }])).into_response()
}

async fn payments(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([{ "id": 20, "amount": 900.0, "status": "paid_out" }])).into_response()
}

async fn wallet(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "balance": 1250.5, "pending": 100.0 })).into_response()
}
