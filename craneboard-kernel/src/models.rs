/**
 * MODÈLES - Enregistrements grue / utilisateur / analytics
 *
 * RÔLE :
 * Types échangés avec l'API amont et exposés par le kernel. Les payloads
 * viennent d'un backend qu'on ne contrôle pas : la désérialisation est
 * tolérante, un champ optionnel mal formé ne rejette jamais la grue entière.
 *
 * CONVENTIONS :
 * - Champs JSON en camelCase (contrat de l'API grues)
 * - Coordonnées `locationData.coordinates` = [lng, lat], jamais inversées
 * - Fin de course (ls1..ls4) = enum fermé, clé absente → UNKNOWN
 */

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;

// ===== Grue =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Crane {
    /// Certains backends envoient un id numérique
    #[serde(deserialize_with = "lenient::id")]
    pub crane_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub location: Option<String>,
    /// Charge maximale d'utilisation (kg)
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub swl: Option<f64>,

    // télémétrie live (broker), peut manquer
    #[serde(default, deserialize_with = "lenient::bool")]
    pub online: bool,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub current_load: Option<f64>,
    /// Minutes d'utilisation sur la journée (0..1440)
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub utilization: Option<f64>,
    #[serde(default, with = "lenient::timestamp")]
    pub last_seen: Option<OffsetDateTime>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub wind_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub is_overloaded: Option<bool>,
    #[serde(default)]
    pub last_status_raw: LastStatusRaw,

    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub location_data: Option<LocationData>,

    // agrégats calculés côté backend, transmis tels quels
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub tickets: Option<Tickets>,
    #[serde(default, deserialize_with = "lenient::array")]
    pub utilization_trend: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::array")]
    pub peak_load_trend: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::array")]
    pub historical_data: Vec<Value>,
}

impl Crane {
    pub fn new(crane_id: impl Into<String>) -> Self {
        Self {
            crane_id: crane_id.into(),
            name: String::new(),
            location: None,
            swl: None,
            online: false,
            current_load: None,
            utilization: None,
            last_seen: None,
            wind_speed: None,
            is_overloaded: None,
            last_status_raw: LastStatusRaw::default(),
            location_data: None,
            tickets: None,
            utilization_trend: Vec::new(),
            peak_load_trend: Vec::new(),
            historical_data: Vec::new(),
        }
    }

    /// Nom affichable : le nom, sinon l'identifiant
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.crane_id
        } else {
            &self.name
        }
    }

    pub fn overloaded(&self) -> bool {
        self.is_overloaded.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tickets {
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    /// Brut tel que reçu ; validé par `lng_lat()`
    #[serde(default)]
    pub coordinates: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub location_source: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub location_method: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub location_accuracy: Option<f64>,
}

impl LocationData {
    /// Coordonnées GPS embarquées si exactement deux nombres finis `[lng, lat]`
    pub fn lng_lat(&self) -> Option<LatLng> {
        let Some(Value::Array(pair)) = &self.coordinates else {
            return None;
        };
        if pair.len() != 2 {
            return None;
        }
        let lng = pair[0].as_f64()?;
        let lat = pair[1].as_f64()?;
        if !lng.is_finite() || !lat.is_finite() {
            return None;
        }
        Some(LatLng { lat, lng })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

// ===== Fins de course =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LimitSwitch {
    #[serde(rename = "ls1")]
    Ls1,
    #[serde(rename = "ls2")]
    Ls2,
    #[serde(rename = "ls3")]
    Ls3,
    #[serde(rename = "ls4")]
    Ls4,
}

impl LimitSwitch {
    pub const ALL: [LimitSwitch; 4] = [Self::Ls1, Self::Ls2, Self::Ls3, Self::Ls4];

    pub fn key(self) -> &'static str {
        match self {
            Self::Ls1 => "ls1",
            Self::Ls2 => "ls2",
            Self::Ls3 => "ls3",
            Self::Ls4 => "ls4",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ls| ls.key().eq_ignore_ascii_case(key.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SwitchStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl SwitchStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OK" => Self::Ok,
            "FAIL" => Self::Fail,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Dernier statut brut remonté par la grue : fins de course typées +
/// le reste des champs conservé tel quel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastStatusRaw {
    switches: BTreeMap<LimitSwitch, SwitchStatus>,
    pub extra: Map<String, Value>,
}

impl LastStatusRaw {
    pub fn switch(&self, ls: LimitSwitch) -> SwitchStatus {
        self.switches.get(&ls).copied().unwrap_or_default()
    }

    pub fn set_switch(&mut self, ls: LimitSwitch, status: SwitchStatus) {
        self.switches.insert(ls, status);
    }

    pub fn any_failed(&self) -> bool {
        LimitSwitch::ALL
            .into_iter()
            .any(|ls| self.switch(ls) == SwitchStatus::Fail)
    }

    /// Applique un statut partiel : les clés présentes écrasent les anciennes
    pub fn merge(&mut self, patch: LastStatusRaw) {
        self.switches.extend(patch.switches);
        self.extra.extend(patch.extra);
    }

    fn from_object(obj: Map<String, Value>) -> Self {
        let mut raw = Self::default();
        for (key, value) in obj {
            match LimitSwitch::from_key(&key) {
                Some(ls) => {
                    let status = value.as_str().map(SwitchStatus::parse).unwrap_or_default();
                    raw.switches.insert(ls, status);
                }
                None => {
                    raw.extra.insert(key, value);
                }
            }
        }
        raw
    }
}

impl Serialize for LastStatusRaw {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.switches.len() + self.extra.len()))?;
        for (ls, status) in &self.switches {
            map.serialize_entry(ls.key(), status.as_str())?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LastStatusRaw {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(obj) => Ok(Self::from_object(obj)),
            _ => Ok(Self::default()),
        }
    }
}

// ===== Utilisateur (fourni par la session) =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Supervisor,
    Operator,
    Superadmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Supervisor => "supervisor",
            Self::Operator => "operator",
            Self::Superadmin => "superadmin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default, alias = "assigned_cranes")]
    pub assigned_cranes: BTreeSet<String>,
}

// ===== Position résolue (carte) =====

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCraneLocation {
    #[serde(flatten)]
    pub crane: Crane,
    pub coordinates: LatLng,
    pub location_source: String,
    pub display_name: String,
    pub is_online: bool,
}

// ===== Analytics par grue =====

/// Champs sans lesquels un payload analytics est considéré invalide
pub const REQUIRED_ANALYTICS_FIELDS: [&str; 4] = [
    "utilization24h",
    "peakLoad7d",
    "weeklyLimitSwitches",
    "hourlyUtilization",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CraneAnalytics {
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub current_load: f64,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub max_load: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub current_utilization: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub connection_status: String,
    #[serde(default, with = "lenient::timestamp")]
    pub last_seen: Option<OffsetDateTime>,
    #[serde(rename = "utilization24h")]
    pub utilization_24h: Value,
    #[serde(rename = "peakLoad7d")]
    pub peak_load_7d: Value,
    pub weekly_limit_switches: Value,
    pub hourly_utilization: Value,
    #[serde(default, deserialize_with = "lenient::array")]
    pub utilization_trend: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::array")]
    pub peak_load_trend: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::array")]
    pub historical_data: Vec<Value>,
}

impl CraneAnalytics {
    /// État vide documenté, affiché quand le backend n'a rien d'exploitable
    pub fn empty_for(crane: &Crane) -> Self {
        Self {
            current_load: 0.0,
            max_load: crane.swl,
            current_utilization: 0.0,
            connection_status: "No Data".to_string(),
            last_seen: None,
            utilization_24h: Value::Array(Vec::new()),
            peak_load_7d: Value::Array(Vec::new()),
            weekly_limit_switches: Value::Array(Vec::new()),
            hourly_utilization: Value::Array(Vec::new()),
            utilization_trend: Vec::new(),
            peak_load_trend: Vec::new(),
            historical_data: Vec::new(),
        }
    }

    pub fn is_empty_state(&self) -> bool {
        self.connection_status == "No Data"
            && self.historical_data.is_empty()
            && self.utilization_trend.is_empty()
            && self.peak_load_trend.is_empty()
    }

    /// Déclenchements de fins de course sur la semaine.
    /// Accepte `{ls1: n, ...}` ou une liste de tels enregistrements (sommés).
    pub fn limit_switch_triggers(&self) -> BTreeMap<LimitSwitch, u64> {
        let mut counts: BTreeMap<LimitSwitch, u64> =
            LimitSwitch::ALL.into_iter().map(|ls| (ls, 0)).collect();
        let mut add = |obj: &Map<String, Value>| {
            for (key, value) in obj {
                if let (Some(ls), Some(n)) = (LimitSwitch::from_key(key), value.as_u64()) {
                    *counts.entry(ls).or_default() += n;
                }
            }
        };
        match &self.weekly_limit_switches {
            Value::Object(obj) => add(obj),
            Value::Array(days) => days.iter().filter_map(Value::as_object).for_each(add),
            _ => {}
        }
        counts
    }
}

// ===== Statut broker =====

/// Réponse de `GET /api/mqtt/status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttStatus {
    #[serde(default, deserialize_with = "lenient::bool")]
    pub connected: bool,
    #[serde(default, deserialize_with = "lenient::string")]
    pub broker: String,
}

/// Vue exposée au tableau de bord
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerStatus {
    pub connected: bool,
    pub broker: String,
    pub loading: bool,
}

impl Default for BrokerStatus {
    fn default() -> Self {
        Self { connected: false, broker: String::new(), loading: true }
    }
}

impl BrokerStatus {
    pub fn failed() -> Self {
        Self { connected: false, broker: "Error".to_string(), loading: false }
    }
}

impl From<MqttStatus> for BrokerStatus {
    fn from(status: MqttStatus) -> Self {
        Self { connected: status.connected, broker: status.broker, loading: false }
    }
}

/// Désérialiseurs tolérants : une valeur inattendue devient la valeur par défaut
pub(crate) mod lenient {
    use super::*;
    use serde::de::DeserializeOwned;
    use time::format_description::well_known::Rfc3339;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_string(d)?.unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        })
    }

    /// Chaîne ou nombre ; tout autre type rejette l'enregistrement
    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        opt_string(d)?.ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
    }

    pub fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(opt_f64(d)?.unwrap_or(0.0))
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => Some(b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        })
    }

    pub fn bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(opt_bool(d)?.unwrap_or(false))
    }

    pub fn array<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
    }

    pub fn opt_struct<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(Value::deserialize(d)?).ok())
    }

    /// RFC 3339 ou millisecondes epoch ; le reste → None
    pub mod timestamp {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<OffsetDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts.and_then(|t| t.format(&Rfc3339).ok()) {
                Some(text) => serializer.serialize_some(&text),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<OffsetDateTime>, D::Error> {
            Ok(match Value::deserialize(d)? {
                Value::String(s) => OffsetDateTime::parse(s.trim(), &Rfc3339).ok(),
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|v| v as i64))
                    .and_then(|ms| {
                        OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
                    }),
                _ => None,
            })
        }
    }
}
