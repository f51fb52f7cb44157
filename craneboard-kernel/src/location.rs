/**
 * RÉSOLUTION DES POSITIONS - Grues → marqueurs carte
 *
 * RÔLE :
 * Transforme la liste de grues en positions affichables, en sautant
 * silencieusement celles qu'on ne sait pas placer.
 *
 * FONCTIONNEMENT :
 * 1. `locationData.coordinates` valides ([lng, lat]) → source déclarée ou "gps"
 * 2. Sinon géocodage du texte `location` → source "city_geocoded"
 *    (service distant d'abord, puis table statique des grandes villes)
 * 3. Sinon la grue n'apparaît pas sur la carte (jamais de point par défaut)
 *
 * MÉMOÏSATION :
 * Une réponse du service (trouvé ou introuvable) est gardée par lieu, en
 * minuscules ; une erreur réseau n'est pas retenue et sera retentée.
 *
 * CONCURRENCE :
 * Les géocodages partent tous en même temps ; l'ordre de sortie reste celui
 * d'entrée quel que soit l'ordre de complétion. Un échec ne retire que sa grue.
 */

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeocodingConf;
use crate::models::{Crane, LatLng, ResolvedCraneLocation};

pub const SOURCE_GPS: &str = "gps";
pub const SOURCE_CITY_GEOCODED: &str = "city_geocoded";

/// Repli quand le service de géocodage ne répond pas ou ne trouve rien
const FALLBACK_CITIES: [(&str, LatLng); 10] = [
    ("london", LatLng { lat: 51.5074, lng: -0.1278 }),
    ("new york", LatLng { lat: 40.7128, lng: -74.0060 }),
    ("paris", LatLng { lat: 48.8566, lng: 2.3522 }),
    ("dubai", LatLng { lat: 25.2048, lng: 55.2708 }),
    ("singapore", LatLng { lat: 1.3521, lng: 103.8198 }),
    ("tokyo", LatLng { lat: 35.6762, lng: 139.6503 }),
    ("sydney", LatLng { lat: -33.8688, lng: 151.2093 }),
    ("mumbai", LatLng { lat: 19.0760, lng: 72.8777 }),
    ("delhi", LatLng { lat: 28.7041, lng: 77.1025 }),
    ("berlin", LatLng { lat: 52.5200, lng: 13.4050 }),
];

pub fn fallback_city(place: &str) -> Option<LatLng> {
    let wanted = place.trim().to_lowercase();
    FALLBACK_CITIES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, coords)| *coords)
}

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoding service answered {0}")]
    Status(reqwest::StatusCode),
}

/// Service de géocodage distant
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Premier candidat pour un nom de lieu ; `Ok(None)` si aucun résultat
    async fn lookup(&self, place: &str) -> Result<Option<LatLng>, GeocodeError>;
}

#[async_trait]
impl<G: Geocoder + ?Sized> Geocoder for Box<G> {
    async fn lookup(&self, place: &str) -> Result<Option<LatLng>, GeocodeError> {
        (**self).lookup(place).await
    }
}

/// Géocodeur HTTP compatible Nominatim (`/search?format=json&q=...`)
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    lat: Value,
    lon: Value,
}

impl NominatimGeocoder {
    pub fn new(conf: &GeocodingConf) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: conf.base_url.trim_end_matches('/').to_string(),
            user_agent: conf.user_agent.clone(),
        })
    }
}

/// Nominatim renvoie lat/lon en chaînes, d'autres services en nombres
fn coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn lookup(&self, place: &str) -> Result<Option<LatLng>, GeocodeError> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("limit", "1"), ("q", place)])
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status()));
        }

        let candidates: Vec<Candidate> = response.json().await?;
        Ok(candidates.first().and_then(|c| {
            Some(LatLng { lat: coordinate(&c.lat)?, lng: coordinate(&c.lon)? })
        }))
    }
}

pub struct LocationResolver<G> {
    geocoder: G,
    known: Mutex<HashMap<String, Option<LatLng>>>,
}

impl<G: Geocoder> LocationResolver<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder, known: Mutex::new(HashMap::new()) }
    }

    /// Service distant, puis table de repli ; `None` si rien ne correspond
    pub async fn geocode(&self, place: &str) -> Option<LatLng> {
        let place = place.trim();
        if place.is_empty() {
            return None;
        }
        let key = place.to_lowercase();
        let known = self.known.lock().get(&key).copied();
        let remote = match known {
            Some(remote) => remote,
            None => match self.geocoder.lookup(place).await {
                Ok(remote) => {
                    if remote.is_none() {
                        debug!("no geocoding result for '{}'", place);
                    }
                    self.known.lock().insert(key, remote);
                    remote
                }
                Err(e) => {
                    warn!("geocoding '{}' failed: {}", place, e);
                    None
                }
            },
        };
        remote.or_else(|| fallback_city(place))
    }

    async fn resolve_one(&self, crane: &Crane) -> Option<ResolvedCraneLocation> {
        let gps = crane.location_data.as_ref().and_then(|data| {
            let coords = data.lng_lat()?;
            let source = data
                .location_source
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| SOURCE_GPS.to_string());
            Some((coords, source))
        });

        let (coordinates, location_source) = match gps {
            Some(found) => found,
            None => {
                let place = crane.location.as_deref()?;
                (self.geocode(place).await?, SOURCE_CITY_GEOCODED.to_string())
            }
        };

        Some(ResolvedCraneLocation {
            crane: crane.clone(),
            coordinates,
            location_source,
            display_name: crane.display_name().to_string(),
            is_online: crane.online,
        })
    }

    pub async fn resolve(&self, cranes: &[Crane]) -> Vec<ResolvedCraneLocation> {
        let resolved = join_all(cranes.iter().map(|crane| self.resolve_one(crane))).await;
        let total = cranes.len();
        let placed: Vec<_> = resolved.into_iter().flatten().collect();
        if placed.len() < total {
            debug!("{} of {} cranes have no map position", total - placed.len(), total);
        }
        placed
    }
}
