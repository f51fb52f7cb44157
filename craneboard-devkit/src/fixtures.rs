/*!
Fixtures JSON au format du backend grues

Construit les payloads tels que l'API les renvoie (camelCase, champs
optionnels absents tant qu'on ne les pose pas), pour alimenter le mock
HTTP ou les tests de désérialisation.
*/

use serde_json::{json, Map, Value};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

/// Builder d'un enregistrement grue
#[derive(Debug, Clone)]
pub struct CraneFixture {
    fields: Map<String, Value>,
}

impl CraneFixture {
    pub fn new(crane_id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("craneId".into(), json!(crane_id));
        Self { fields }
    }

    fn set(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.set("name", json!(name))
    }

    pub fn location(self, place: &str) -> Self {
        self.set("location", json!(place))
    }

    /// GPS au format backend : [lng, lat]
    pub fn gps(self, lng: f64, lat: f64) -> Self {
        self.set("locationData", json!({ "coordinates": [lng, lat], "locationSource": "gps" }))
    }

    pub fn swl(self, kg: f64) -> Self {
        self.set("swl", json!(kg))
    }

    pub fn online(self, online: bool) -> Self {
        self.set("online", json!(online))
    }

    pub fn load(self, kg: f64) -> Self {
        self.set("currentLoad", json!(kg))
    }

    pub fn utilization(self, minutes: f64) -> Self {
        self.set("utilization", json!(minutes))
    }

    pub fn wind(self, mps: f64) -> Self {
        self.set("windSpeed", json!(mps))
    }

    pub fn overloaded(self, flag: bool) -> Self {
        self.set("isOverloaded", json!(flag))
    }

    pub fn last_seen(self, at: OffsetDateTime) -> Self {
        let formatted = at.format(&Rfc3339).unwrap_or_default();
        self.set("lastSeen", json!(formatted))
    }

    pub fn last_seen_minutes_ago(self, minutes: i64) -> Self {
        self.last_seen(OffsetDateTime::now_utc() - Duration::minutes(minutes))
    }

    /// Statuts de fins de course, ex. `[("ls1", "OK"), ("ls3", "FAIL")]`
    pub fn limit_switches(self, statuses: &[(&str, &str)]) -> Self {
        let raw: Map<String, Value> = statuses.iter().map(|(k, v)| (k.to_string(), json!(v))).collect();
        self.set("lastStatusRaw", Value::Object(raw))
    }

    pub fn tickets(self, total: u64) -> Self {
        self.set("tickets", json!({ "total": total }))
    }

    /// Champ arbitraire (valeurs mal typées, champs inconnus...)
    pub fn raw(self, key: &str, value: Value) -> Self {
        self.set(key, value)
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Enveloppe de `GET /api/cranes` : `{ data: { cranes: [...] } }`
pub fn crane_list(cranes: Vec<Value>) -> Value {
    json!({ "data": { "cranes": cranes } })
}

/// Analytics complètes (tous les champs requis présents)
pub fn analytics(current_load: f64, connection_status: &str) -> Value {
    json!({
        "currentLoad": current_load,
        "maxLoad": 50000,
        "currentUtilization": 62.5,
        "connectionStatus": connection_status,
        "lastSeen": "2026-03-01T12:00:00Z",
        "utilization24h": [{ "hour": 8, "value": 45 }],
        "peakLoad7d": [{ "day": "Mon", "value": 41000 }],
        "weeklyLimitSwitches": { "ls1": 3, "ls2": 0, "ls3": 1, "ls4": 0 },
        "hourlyUtilization": [{ "hour": 8, "minutes": 45 }],
        "utilizationTrend": [],
        "peakLoadTrend": [],
        "historicalData": []
    })
}

/// Réponse du pont MQTT côté backend
pub fn mqtt_status(connected: bool, broker: &str) -> Value {
    json!({ "connected": connected, "broker": broker })
}

/// Un candidat Nominatim (lat/lon en chaînes, comme le vrai service)
pub fn geocode_hit(lat: f64, lon: f64) -> Value {
    json!([{ "lat": lat.to_string(), "lon": lon.to_string(), "display_name": "fixture" }])
}

/// Payload de télémétrie live
pub fn telemetry(online: bool, current_load: f64) -> Value {
    json!({ "online": online, "currentLoad": current_load })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crane_fixture_only_sets_given_fields() {
        let crane = CraneFixture::new("TC-1").swl(50.0).load(25.0).build();
        assert_eq!(crane["craneId"], "TC-1");
        assert_eq!(crane["swl"], 50.0);
        assert!(crane.get("location").is_none());

        let list = crane_list(vec![crane]);
        assert_eq!(list["data"]["cranes"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_geocode_hit_uses_strings() {
        let hit = geocode_hit(48.85, 2.35);
        assert_eq!(hit[0]["lat"], "48.85");
    }
}
