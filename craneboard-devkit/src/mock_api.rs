/*!
Mock du backend grues pour tests sans serveur réel

Serveur Axum sur un port éphémère (127.0.0.1:0) qui rejoue des réponses
scriptées :
- `GET /api/cranes` : liste de grues (paramètre `limit` enregistré)
- `GET /api/cranes/{id}/analytics` : analytics par grue (404 sinon)
- `GET /api/mqtt/status` : séquence de statuts, la dernière est rejouée
- `GET /search` : géocodage façon Nominatim, `[]` pour un lieu inconnu
- `/api/echo` (tout verbe) : renvoie le corps reçu, pour tester le client

Chaque route compte ses appels ; `fail_next` force un échec HTTP sur la
prochaine requête, quelle que soit la route.
*/

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Default)]
struct MockState {
    cranes: Value,
    analytics: HashMap<String, Value>,
    mqtt: VecDeque<(StatusCode, Value)>,
    places: HashMap<String, Value>,
    failures: VecDeque<(StatusCode, Value)>,
    hits: HashMap<&'static str, usize>,
    last_limit: Option<u32>,
    last_auth: Option<String>,
    last_user_agent: Option<String>,
}

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<MockState>>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compte l'appel et consomme un échec forcé s'il y en a un
    fn enter(&self, route: &'static str, headers: &HeaderMap) -> Option<Response> {
        let mut st = self.lock();
        *st.hits.entry(route).or_default() += 1;
        st.last_auth = header(headers, "authorization");
        let (status, body) = st.failures.pop_front()?;
        log::info!("[mock-api] forced {} on {}", status, route);
        Some((status, Json(body)).into_response())
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Backend grues scripté
pub struct MockCraneApi {
    addr: SocketAddr,
    state: Shared,
    task: JoinHandle<()>,
}

impl MockCraneApi {
    pub async fn start() -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let state = Shared::default();
        state.lock().cranes = json!({ "data": { "cranes": [] } });

        let app = Router::new()
            .route("/api/cranes", get(list_cranes))
            .route("/api/cranes/{id}/analytics", get(crane_analytics))
            .route("/api/mqtt/status", get(mqtt_status))
            .route("/api/echo", any(echo))
            .route("/search", get(search))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::warn!("[mock-api] server stopped: {}", e);
            }
        });
        log::info!("[mock-api] listening on {}", addr);
        Ok(Self { addr, state, task })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Remplace la réponse de `GET /api/cranes`
    pub fn set_cranes(&self, payload: Value) {
        self.state.lock().cranes = payload;
    }

    pub fn set_analytics(&self, crane_id: &str, payload: Value) {
        self.state.lock().analytics.insert(crane_id.to_string(), payload);
    }

    /// Ajoute un statut broker à la séquence
    pub fn push_mqtt_status(&self, payload: Value) {
        self.state.lock().mqtt.push_back((StatusCode::OK, payload));
    }

    pub fn push_mqtt_failure(&self, status: StatusCode) {
        self.state.lock().mqtt.push_back((status, json!({ "message": "bridge down" })));
    }

    /// Résultat de géocodage pour un lieu (comparaison insensible à la casse)
    pub fn set_place(&self, place: &str, payload: Value) {
        self.state.lock().places.insert(place.to_lowercase(), payload);
    }

    /// La prochaine requête (toute route) répondra `status` avec `body`
    pub fn fail_next(&self, status: StatusCode, body: Value) {
        self.state.lock().failures.push_back((status, body));
    }

    pub fn hits(&self, route: &str) -> usize {
        self.state.lock().hits.get(route).copied().unwrap_or(0)
    }

    pub fn last_limit(&self) -> Option<u32> {
        self.state.lock().last_limit
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.lock().last_auth.clone()
    }

    pub fn last_user_agent(&self) -> Option<String> {
        self.state.lock().last_user_agent.clone()
    }
}

impl Drop for MockCraneApi {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn list_cranes(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(forced) = state.enter("cranes", &headers) {
        return forced;
    }
    let mut st = state.lock();
    st.last_limit = params.get("limit").and_then(|l| l.parse().ok());
    Json(st.cranes.clone()).into_response()
}

async fn crane_analytics(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if let Some(forced) = state.enter("analytics", &headers) {
        return forced;
    }
    match state.lock().analytics.get(&id) {
        Some(payload) => Json(payload.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "Crane not found" }))).into_response(),
    }
}

async fn mqtt_status(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Some(forced) = state.enter("mqtt", &headers) {
        return forced;
    }
    let mut st = state.lock();
    let next = if st.mqtt.len() > 1 { st.mqtt.pop_front() } else { st.mqtt.front().cloned() };
    match next {
        Some((status, body)) => (status, Json(body)).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "no status scripted" }))).into_response(),
    }
}

async fn search(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(forced) = state.enter("search", &headers) {
        return forced;
    }
    let mut st = state.lock();
    st.last_user_agent = header(&headers, "user-agent");
    let place = params.get("q").map(|q| q.to_lowercase()).unwrap_or_default();
    let payload = st.places.get(&place).cloned().unwrap_or_else(|| json!([]));
    Json(payload).into_response()
}

async fn echo(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(forced) = state.enter("echo", &headers) {
        return forced;
    }
    if body.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => Json(json!({ "echo": value })).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid JSON" }))).into_response(),
    }
}
