/**
 * TÉLÉMÉTRIE LIVE - Patches MQTT appliqués au cache des grues
 *
 * RÔLE :
 * Entre deux refresh de l'API, la télémétrie publiée par les grues met à
 * jour le cache (online, charge, utilisation, vent, fins de course).
 *
 * FONCTIONNEMENT :
 * - Abonnement à `{prefix}/+/telemetry`, réabonnement à chaque ConnAck
 * - Payload JSON partiel ; les champs présents écrasent, `lastSeen` = maintenant
 * - Grue inconnue ou JSON invalide : log et on ignore
 * - Erreur broker : health `reconnecting`, compteur incrémenté, pause 2 s
 */

use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::models::{lenient, Crane, LastStatusRaw};
use crate::state::{CraneCache, Shared};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPatch {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub online: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub current_load: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub utilization: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub wind_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub is_overloaded: Option<bool>,
    #[serde(default)]
    pub last_status_raw: Option<LastStatusRaw>,
}

impl TelemetryPatch {
    pub fn apply(self, crane: &mut Crane, now: OffsetDateTime) {
        if let Some(online) = self.online {
            crane.online = online;
        }
        if self.current_load.is_some() {
            crane.current_load = self.current_load;
        }
        if self.utilization.is_some() {
            crane.utilization = self.utilization;
        }
        if self.wind_speed.is_some() {
            crane.wind_speed = self.wind_speed;
        }
        if self.is_overloaded.is_some() {
            crane.is_overloaded = self.is_overloaded;
        }
        if let Some(raw) = self.last_status_raw {
            crane.last_status_raw.merge(raw);
        }
        crane.last_seen = Some(now);
    }
}

pub fn telemetry_filter(prefix: &str) -> String {
    format!("{}/+/telemetry", prefix.trim_end_matches('/'))
}

/// `{prefix}/{craneId}/telemetry` → craneId
pub fn crane_id_from_topic<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    let rest = topic.strip_prefix(prefix.trim_end_matches('/'))?.strip_prefix('/')?;
    let id = rest.strip_suffix("/telemetry")?;
    (!id.is_empty() && !id.contains('/')).then_some(id)
}

/// Applique un message ; `false` si ignoré
pub fn apply_telemetry(
    cache: &mut CraneCache,
    prefix: &str,
    topic: &str,
    payload: &[u8],
    now: OffsetDateTime,
) -> bool {
    let Some(crane_id) = crane_id_from_topic(prefix, topic) else {
        debug!("ignoring message on unexpected topic {}", topic);
        return false;
    };
    let patch: TelemetryPatch = match serde_json::from_slice(payload) {
        Ok(patch) => patch,
        Err(e) => {
            warn!("invalid telemetry JSON for {}: {}", crane_id, e);
            return false;
        }
    };
    let Some(crane) = cache.iter_mut().find(|c| c.crane_id == crane_id) else {
        debug!("telemetry for unknown crane {}", crane_id);
        return false;
    };
    patch.apply(crane, now);
    true
}

pub fn spawn_telemetry_listener(
    conf: MqttConf,
    cache: Shared<CraneCache>,
    health: HealthTracker,
) -> JoinHandle<()> {
    task::spawn(async move {
        let mut opts = MqttOptions::new("craneboard-kernel", &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        let filter = telemetry_filter(&conf.topic_prefix);
        info!("telemetry listener on {}:{} ({})", conf.host, conf.port, filter);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_mqtt_connected();
                    if let Err(e) = client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                        warn!("telemetry subscribe failed: {}", e);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let now = OffsetDateTime::now_utc();
                    apply_telemetry(&mut cache.lock(), &conf.topic_prefix, &p.topic, &p.payload, now);
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => health.mark_mqtt_disconnected(),
                Ok(_) => {}
                Err(e) => {
                    warn!("telemetry broker error: {}", e);
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LimitSwitch, SwitchStatus};
    use time::macros::datetime;

    fn cache() -> CraneCache {
        let mut crane = Crane::new("TC-1");
        crane.current_load = Some(1000.0);
        crane.wind_speed = Some(3.0);
        vec![crane, Crane::new("TC-2")]
    }

    #[test]
    fn test_topic_parsing() {
        assert_eq!(crane_id_from_topic("cranes", "cranes/TC-1/telemetry"), Some("TC-1"));
        assert_eq!(crane_id_from_topic("cranes/", "cranes/TC-1/telemetry"), Some("TC-1"));
        assert_eq!(crane_id_from_topic("cranes", "cranes//telemetry"), None);
        assert_eq!(crane_id_from_topic("cranes", "cranes/TC-1/status"), None);
        assert_eq!(crane_id_from_topic("cranes", "other/TC-1/telemetry"), None);
        assert_eq!(telemetry_filter("cranes/"), "cranes/+/telemetry");
    }

    #[test]
    fn test_patch_merges_present_fields_only() {
        let mut cache = cache();
        let now = datetime!(2026-03-01 12:00 UTC);
        let payload = br#"{"online": true, "currentLoad": "2500", "lastStatusRaw": {"ls2": "FAIL"}}"#;

        assert!(apply_telemetry(&mut cache, "cranes", "cranes/TC-1/telemetry", payload, now));
        let crane = &cache[0];
        assert!(crane.online);
        assert_eq!(crane.current_load, Some(2500.0));
        assert_eq!(crane.wind_speed, Some(3.0));
        assert_eq!(crane.last_seen, Some(now));
        assert_eq!(crane.last_status_raw.switch(LimitSwitch::Ls2), SwitchStatus::Fail);
        assert_eq!(cache[1].last_seen, None);
    }

    #[test]
    fn test_unknown_crane_and_bad_json_are_ignored() {
        let mut cache = cache();
        let before = cache.clone();
        let now = datetime!(2026-03-01 12:00 UTC);

        assert!(!apply_telemetry(&mut cache, "cranes", "cranes/TC-9/telemetry", b"{}", now));
        assert!(!apply_telemetry(&mut cache, "cranes", "cranes/TC-1/telemetry", b"not json", now));
        assert_eq!(cache, before);
    }
}
