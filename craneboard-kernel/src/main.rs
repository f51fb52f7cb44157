/**
 * CRANEBOARD KERNEL - Point d'entrée du serveur
 *
 * RÔLE : Orchestration des modules : config, client API, pollers, télémétrie, HTTP.
 * Bootstrap complet avec logs structurés ; seules les erreurs de démarrage sont fatales.
 *
 * ARCHITECTURE : refresh périodique de l'API + patches MQTT live + vues REST par rôle.
 */

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use craneboard_kernel::api::{ApiClient, CranesApi};
use craneboard_kernel::config::load_config;
use craneboard_kernel::fleet::spawn_crane_refresh;
use craneboard_kernel::health::HealthTracker;
use craneboard_kernel::http::{self, AppState};
use craneboard_kernel::location::{Geocoder, LocationResolver, NominatimGeocoder};
use craneboard_kernel::map::MapView;
use craneboard_kernel::notify::RecordingNotifier;
use craneboard_kernel::session::StaticSessions;
use craneboard_kernel::state::{new_state, CraneCache};
use craneboard_kernel::status::spawn_status_poller;
use craneboard_kernel::telemetry::spawn_telemetry_listener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("craneboard_kernel=info")),
        )
        .init();

    let cfg = load_config().await;
    if cfg.api.base_url.is_empty() {
        warn!("api.base_url is empty, every backend request will fail");
    }

    // toasts gardés pour GET /notifications
    let notifications = RecordingNotifier::new(50);
    let api = Arc::new(ApiClient::new(&cfg.api, Arc::new(notifications.clone())).context("building API client")?);
    let cranes_api = Arc::new(CranesApi::new(api.clone()));
    let health = HealthTracker::new();
    let cranes = new_state(CraneCache::new());

    // pollers (tick immédiat puis toutes les N secondes)
    let (broker, status_poller) =
        spawn_status_poller(cranes_api.clone(), Duration::from_secs(cfg.polling.status_interval_secs));
    let refresh_period = Duration::from_secs(cfg.polling.cranes_interval_secs);
    let fleet_poller = spawn_crane_refresh(cranes_api.clone(), cfg.api.crane_limit, cranes.clone(), refresh_period);

    // télémétrie live optionnelle
    match cfg.mqtt.clone() {
        Some(conf) => {
            spawn_telemetry_listener(conf, cranes.clone(), health.clone());
        }
        None => {
            info!("no mqtt section, live telemetry disabled");
            health.mark_mqtt_disabled();
        }
    }

    let geocoder: Box<dyn Geocoder> =
        Box::new(NominatimGeocoder::new(&cfg.geocoding).context("building geocoding client")?);
    let map = Arc::new(MapView::new(LocationResolver::new(geocoder)));

    let sessions = StaticSessions::new(cfg.sessions.clone());
    if sessions.is_empty() {
        warn!("no sessions configured, every authenticated route will answer 401");
    } else {
        info!("{} api keys loaded", sessions.len());
    }

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        cranes,
        sessions: Arc::new(sessions),
        source: cranes_api,
        map,
        broker,
        health,
        notifications,
        api,
        crane_limit: cfg.api.crane_limit,
        refresh_period,
        user_sessions: Default::default(),
    };
    let app = http::build_router(app_state.clone());

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("binding {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {}", e);
            }
        })
        .await
        .context("http server")?;

    info!("shutting down pollers");
    app_state.stop_analytics_views().await;
    status_poller.stop().await;
    fleet_poller.stop().await;
    Ok(())
}
