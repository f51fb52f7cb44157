/**
 * API REST CRANEBOARD - Surface HTTP des vues du tableau de bord
 *
 * RÔLE :
 * Expose les modèles de vue (cartes, marqueurs, analytics, navigation) déjà
 * filtrés pour l'utilisateur appelant.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, middleware `x-api-key` → utilisateur via `SessionProvider`
 * - Routes : /health, /system, /cranes, /analytics, /dashboard, /selection,
 *   /navigation, /screens, /notifications, /requests
 * - État par clé API : sélection transmise, état du tableau de bord,
 *   vue analytics (créée à la première visite, avec son refresh ;
 *   DELETE /analytics ou l'arrêt du kernel stoppe ce refresh)
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health (clé inconnue → 401)
 * - Grue hors du périmètre du rôle → 404, écran réservé → redirection /dashboard
 */

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::analytics::{AnalyticsSnapshot, AnalyticsView};
use crate::api::{ApiClient, CraneSource, RequestState};
use crate::cards::CraneCard;
use crate::dashboard::{reduce, DashboardEvent, DashboardState, SelectionHandoff};
use crate::health::{HealthTracker, KernelHealth};
use crate::location::Geocoder;
use crate::map::MapView;
use crate::models::{BrokerStatus, Crane, CraneAnalytics, ResolvedCraneLocation, User};
use crate::notify::{Notification, RecordingNotifier};
use crate::poller::PollHandle;
use crate::roles::{navigation, screen_access, visible_cranes, NavItem, Screen, ScreenAccess};
use crate::session::SessionProvider;
use crate::state::{CraneCache, Shared};

/// État propre à une clé API
#[derive(Default)]
pub struct UserSession {
    pub handoff: SelectionHandoff,
    pub dashboard: DashboardState,
    analytics: Option<ActiveAnalytics>,
}

/// Vue analytics ouverte ; `poll` reste vide pendant l'activation
struct ActiveAnalytics {
    view: AnalyticsView,
    poll: Option<PollHandle>,
}

#[derive(Clone)]
pub struct AppState {
    pub cranes: Shared<CraneCache>,
    pub sessions: Arc<dyn SessionProvider>,
    pub source: Arc<dyn CraneSource>,
    pub map: Arc<MapView<Box<dyn Geocoder>>>,
    pub broker: watch::Receiver<BrokerStatus>,
    pub health: HealthTracker,
    pub notifications: RecordingNotifier,
    pub api: Arc<ApiClient>,
    pub crane_limit: u32,
    pub refresh_period: Duration,
    pub user_sessions: Shared<HashMap<String, UserSession>>,
}

impl AppState {
    fn visible(&self, user: &User) -> Vec<Crane> {
        visible_cranes(&self.cranes.lock(), user)
    }

    fn visible_crane(&self, user: &User, crane_id: &str) -> Option<Crane> {
        if !user.can_see_crane(crane_id) {
            return None;
        }
        self.cranes.lock().iter().find(|c| c.crane_id == crane_id).cloned()
    }

    fn with_session<R>(&self, key: &str, f: impl FnOnce(&mut UserSession) -> R) -> R {
        let mut sessions = self.user_sessions.lock();
        f(sessions.entry(key.to_string()).or_default())
    }

    /// Ferme toutes les vues analytics ouvertes (arrêt du kernel)
    pub async fn stop_analytics_views(&self) {
        let polls: Vec<PollHandle> = self
            .user_sessions
            .lock()
            .values_mut()
            .filter_map(|session| session.analytics.take())
            .filter_map(|active| active.poll)
            .collect();
        for poll in polls {
            poll.stop().await;
        }
    }
}

/// Appelant authentifié, posé dans les extensions par le middleware
#[derive(Clone)]
pub struct Caller {
    pub key: String,
    pub user: User,
}

async fn require_session(
    State(app): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let key = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let Some(user) = app.sessions.user_for_key(&key) else {
        warn!("unauthorized request to {}", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    };
    req.extensions_mut().insert(Caller { key, user });
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/mqtt/status", get(get_broker_status))
        .route("/cranes", get(get_cranes))
        .route("/cranes/map", get(get_crane_map))
        .route("/cranes/{id}/analytics", get(get_crane_analytics))
        .route("/analytics", get(get_analytics_view).delete(close_analytics_view))
        .route("/analytics/select", post(select_analytics_crane))
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/events", post(post_dashboard_event))
        .route("/selection", post(put_selection))
        .route("/selection/take", post(take_selection))
        .route("/navigation", get(get_navigation))
        .route("/screens/{name}", get(get_screen))
        .route("/notifications", get(get_notifications))
        .route("/requests", get(get_request_state))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_session))
        .with_state(app_state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionBody {
    crane_id: String,
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    let tracked = app.cranes.lock().len();
    let broker = app.broker.borrow().clone();
    Json(app.health.get_health(tracked, broker))
}

// GET /mqtt/status
async fn get_broker_status(State(app): State<AppState>) -> Json<BrokerStatus> {
    Json(app.broker.borrow().clone())
}

// GET /cranes (cartes de statut)
async fn get_cranes(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Json<Vec<CraneCard>> {
    Json(app.visible(&caller.user).iter().map(CraneCard::from_crane).collect())
}

// GET /cranes/map
async fn get_crane_map(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Json<Vec<ResolvedCraneLocation>> {
    let cranes = app.cranes.lock().clone();
    Json(app.map.markers(&cranes, &caller.user).await)
}

// GET /cranes/{id}/analytics
async fn get_crane_analytics(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<CraneAnalytics>, StatusCode> {
    let Some(crane) = app.visible_crane(&caller.user, &id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(app.source.crane_analytics(&crane).await))
}

/// Vue analytics de l'appelant ; créée (et rafraîchie une fois) à la première visite.
/// Une sélection transmise depuis le tableau de bord est consommée ici.
async fn open_analytics_view(app: &AppState, caller: &Caller) -> AnalyticsView {
    let (view, pending, handoff) = app.with_session(&caller.key, |session| {
        if let Some(active) = &session.analytics {
            return (active.view.clone(), session.handoff.take(), None);
        }
        let view = AnalyticsView::new(app.source.clone(), caller.user.clone(), app.crane_limit);
        session.analytics = Some(ActiveAnalytics { view: view.clone(), poll: None });
        (view, None, Some(session.handoff.clone()))
    });

    if let Some(handoff) = handoff {
        let poll = view.activate(&handoff, app.refresh_period).await;
        // vue fermée pendant l'activation : son refresh s'arrête tout de suite
        let orphan = app.with_session(&caller.key, |session| match session.analytics.as_mut() {
            Some(active) if active.view.same_view(&view) => {
                active.poll = Some(poll);
                None
            }
            _ => Some(poll),
        });
        if let Some(poll) = orphan {
            poll.stop().await;
        }
    }
    if let Some(id) = pending {
        debug!("{} opens analytics on {}", caller.user.name, id);
        view.select(&id).await;
    }
    view
}

// GET /analytics
async fn get_analytics_view(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Json<AnalyticsSnapshot> {
    Json(open_analytics_view(&app, &caller).await.snapshot())
}

// DELETE /analytics (page quittée)
async fn close_analytics_view(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> StatusCode {
    let closed = app.with_session(&caller.key, |session| session.analytics.take());
    if let Some(active) = closed {
        if let Some(poll) = active.poll {
            poll.stop().await;
        }
        debug!("analytics view closed for {}", caller.user.name);
    }
    StatusCode::NO_CONTENT
}

// POST /analytics/select { craneId }
async fn select_analytics_crane(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<SelectionBody>,
) -> Result<Json<AnalyticsSnapshot>, StatusCode> {
    let view = open_analytics_view(&app, &caller).await;
    if !view.select(&body.crane_id).await {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(view.snapshot()))
}

// GET /dashboard
async fn get_dashboard(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Json<DashboardState> {
    Json(app.with_session(&caller.key, |session| session.dashboard.clone()))
}

// POST /dashboard/events
async fn post_dashboard_event(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(event): Json<DashboardEvent>,
) -> Json<DashboardState> {
    let state = app.with_session(&caller.key, |session| {
        // clic sur une grue : la sélection suit vers la page analytics
        if let DashboardEvent::CraneSelected(id) = &event {
            session.handoff.put(id.clone());
        }
        session.dashboard = reduce(std::mem::take(&mut session.dashboard), event);
        session.dashboard.clone()
    });
    Json(state)
}

// POST /selection { craneId }
async fn put_selection(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<SelectionBody>,
) -> StatusCode {
    if !caller.user.can_see_crane(&body.crane_id) {
        return StatusCode::NOT_FOUND;
    }
    app.with_session(&caller.key, |session| session.handoff.put(body.crane_id));
    StatusCode::NO_CONTENT
}

// POST /selection/take
async fn take_selection(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Json<Value> {
    let taken = app.with_session(&caller.key, |session| session.handoff.take());
    Json(json!({ "craneId": taken }))
}

// GET /navigation
async fn get_navigation(Extension(caller): Extension<Caller>) -> Json<Vec<NavItem>> {
    Json(navigation(caller.user.role))
}

// GET /screens/{name}
async fn get_screen(Extension(caller): Extension<Caller>, Path(name): Path<String>) -> Response {
    let Some(screen) = Screen::from_name(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match screen_access(&caller.user, screen) {
        ScreenAccess::Granted => Json(json!({ "screen": name, "granted": true })).into_response(),
        ScreenAccess::Redirect(to) => {
            debug!("{} redirected from {} to {}", caller.user.role.as_str(), name, to);
            Redirect::to(to).into_response()
        }
    }
}

// GET /notifications
async fn get_notifications(State(app): State<AppState>) -> Json<Vec<Notification>> {
    Json(app.notifications.recent())
}

// GET /requests (loading / dernière erreur du client API)
async fn get_request_state(State(app): State<AppState>) -> Json<RequestState> {
    Json(app.api.state())
}
