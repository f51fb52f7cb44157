/**
 * CLIENT API AMONT - Enveloppe de requêtes + endpoints grues
 *
 * RÔLE :
 * Cycle de vie uniforme des requêtes vers le backend grues :
 * drapeau `loading`, dernière erreur, toast d'erreur, erreur renvoyée à l'appelant.
 *
 * FONCTIONNEMENT :
 * - `request()` (get/post/patch/delete) : suivie + notifiée
 *   · `error` remis à None au début de chaque requête
 *   · `loading` vrai tant qu'au moins une requête suivie est en vol
 *   · réponse non-2xx → message extrait du JSON (`message`, puis `error`),
 *     sinon message générique ; toast ET Err pour que l'appelant abandonne
 *     ses mises à jour dépendantes
 * - `fetch_json()` : même transport, sans suivi ni toast (pollers, analytics)
 *
 * ENDPOINTS CONSOMMÉS :
 * - GET /api/cranes?limit=N                → { data: { cranes: [...] } }
 * - GET /api/cranes/{craneId}/analytics    → analytics (repli état vide)
 * - GET /api/mqtt/status                   → { connected, broker }
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiConf;
use crate::models::{Crane, CraneAnalytics, MqttStatus, REQUIRED_ANALYTICS_FIELDS};
use crate::notify::{Notification, Notifier};

pub const GENERIC_ERROR: &str = "Something went wrong";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            Self::Decode(_) => None,
        }
    }
}

/// Message d'erreur d'un corps de réponse en échec
pub fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| GENERIC_ERROR.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestState {
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct Tracker {
    in_flight: usize,
    error: Option<String>,
}

/// Décrémente le compteur même si la future est abandonnée en vol
struct InFlight<'a>(&'a Mutex<Tracker>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut t = self.0.lock();
        t.in_flight = t.in_flight.saturating_sub(1);
    }
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
    notifier: Arc<dyn Notifier>,
    tracker: Mutex<Tracker>,
}

impl ApiClient {
    pub fn new(conf: &ApiConf, notifier: Arc<dyn Notifier>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: conf.base_url.trim_end_matches('/').to_string(),
            client,
            token: conf.token.clone().filter(|t| !t.is_empty()),
            notifier,
            tracker: Mutex::new(Tracker::default()),
        })
    }

    pub fn state(&self) -> RequestState {
        let t = self.tracker.lock();
        RequestState { loading: t.in_flight > 0, error: t.error.clone() }
    }

    /// Requête suivie : loading/error + toast en cas d'échec
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        {
            let mut t = self.tracker.lock();
            t.in_flight += 1;
            t.error = None;
        }
        let guard = InFlight(&self.tracker);
        let result = self.send(method, path, body).await;
        drop(guard);

        if let Err(e) = &result {
            let message = e.to_string();
            self.tracker.lock().error = Some(message.clone());
            self.notifier.notify(Notification::error(message));
        }
        result
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ApiError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None).await
    }

    /// GET non suivi et silencieux ; l'appelant gère son propre repli
    pub async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(ApiError::Status { status, message: error_message(&bytes) });
        }

        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?
        };
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

// ===== Sources de données consommées par les pollers et vues =====

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn mqtt_status(&self) -> Result<MqttStatus, ApiError>;
}

#[async_trait]
pub trait CraneSource: Send + Sync {
    async fn list_cranes(&self, limit: u32) -> Result<Vec<Crane>, ApiError>;
    /// Jamais en échec : repli sur l'état vide documenté
    async fn crane_analytics(&self, crane: &Crane) -> CraneAnalytics;
}

#[derive(Clone)]
pub struct CranesApi {
    client: Arc<ApiClient>,
}

impl CranesApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

/// Grues de `{ data: { cranes: [...] } }` ; un enregistrement illisible est ignoré seul
pub fn parse_crane_list(payload: &Value) -> Vec<Crane> {
    let Some(items) = payload.pointer("/data/cranes").and_then(Value::as_array) else {
        warn!("crane list payload has no data.cranes array");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Crane>(item.clone()) {
            Ok(crane) => Some(crane),
            Err(e) => {
                warn!("skipping unreadable crane record: {}", e);
                None
            }
        })
        .collect()
}

/// Analytics valides seulement si les champs requis sont présents et non nuls
pub fn parse_analytics(payload: Value, crane: &Crane) -> Option<CraneAnalytics> {
    let missing: Vec<&str> = REQUIRED_ANALYTICS_FIELDS
        .iter()
        .copied()
        .filter(|field| payload.get(field).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        warn!("analytics for {} missing {:?}", crane.crane_id, missing);
        return None;
    }
    match serde_json::from_value::<CraneAnalytics>(payload) {
        Ok(mut analytics) => {
            if analytics.max_load.is_none() {
                analytics.max_load = crane.swl;
            }
            Some(analytics)
        }
        Err(e) => {
            warn!("analytics for {} unreadable: {}", crane.crane_id, e);
            None
        }
    }
}

#[async_trait]
impl StatusSource for CranesApi {
    async fn mqtt_status(&self) -> Result<MqttStatus, ApiError> {
        self.client.fetch_json("/api/mqtt/status").await
    }
}

#[async_trait]
impl CraneSource for CranesApi {
    async fn list_cranes(&self, limit: u32) -> Result<Vec<Crane>, ApiError> {
        // requête suivie : un échec remonte en toast
        let payload: Value = self.client.get(&format!("/api/cranes?limit={}", limit)).await?;
        Ok(parse_crane_list(&payload))
    }

    async fn crane_analytics(&self, crane: &Crane) -> CraneAnalytics {
        let path = format!("/api/cranes/{}/analytics", urlencoding::encode(&crane.crane_id));
        let analytics = match self.client.fetch_json::<Value>(&path).await {
            Ok(payload) => parse_analytics(payload, crane),
            Err(e) => {
                warn!("analytics fetch for {} failed: {}", crane.crane_id, e);
                None
            }
        };
        analytics.unwrap_or_else(|| CraneAnalytics::empty_for(crane))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_prefers_message_then_error() {
        assert_eq!(error_message(br#"{"message":"Crane locked","error":"x"}"#), "Crane locked");
        assert_eq!(error_message(br#"{"error":"Forbidden"}"#), "Forbidden");
        assert_eq!(error_message(br#"{"message":""}"#), GENERIC_ERROR);
        assert_eq!(error_message(b"<html>502</html>"), GENERIC_ERROR);
        assert_eq!(error_message(b""), GENERIC_ERROR);
    }

    #[test]
    fn test_parse_crane_list_skips_bad_records() {
        let payload = json!({ "data": { "cranes": [
            { "craneId": "TC-1", "online": true },
            { "name": "no id" },
            { "craneId": "TC-2" }
        ]}});
        let ids: Vec<_> = parse_crane_list(&payload).into_iter().map(|c| c.crane_id).collect();
        assert_eq!(ids, vec!["TC-1", "TC-2"]);
        assert!(parse_crane_list(&json!({ "cranes": [] })).is_empty());
    }

    #[test]
    fn test_parse_analytics_requires_all_fields() {
        let mut crane = Crane::new("TC-1");
        crane.swl = Some(12000.0);

        let complete = json!({
            "utilization24h": [1, 2],
            "peakLoad7d": [],
            "weeklyLimitSwitches": {},
            "hourlyUtilization": [],
            "connectionStatus": "Live",
            "currentLoad": 3100
        });
        let analytics = parse_analytics(complete.clone(), &crane).unwrap();
        assert_eq!(analytics.max_load, Some(12000.0));
        assert_eq!(analytics.current_load, 3100.0);
        assert_eq!(analytics.connection_status, "Live");

        for field in REQUIRED_ANALYTICS_FIELDS {
            let mut partial = complete.clone();
            partial.as_object_mut().unwrap().remove(field);
            assert!(parse_analytics(partial, &crane).is_none(), "{field} should be required");
        }

        let mut nulled = complete;
        nulled["hourlyUtilization"] = Value::Null;
        assert!(parse_analytics(nulled, &crane).is_none());
    }

    #[test]
    fn test_empty_state_matches_documented_fallback() {
        let mut crane = Crane::new("TC-3");
        crane.swl = Some(5000.0);
        let empty = CraneAnalytics::empty_for(&crane);
        assert_eq!(empty.current_load, 0.0);
        assert_eq!(empty.max_load, Some(5000.0));
        assert_eq!(empty.current_utilization, 0.0);
        assert_eq!(empty.connection_status, "No Data");
        assert!(empty.last_seen.is_none());
        assert!(empty.is_empty_state());
    }
}
