//! Santé du kernel : uptime, grues suivies, état du listener télémétrie.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::models::BrokerStatus;

#[derive(Debug, Clone, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub cranes_tracked: u32,
    /// listener télémétrie : connecting, connected, disconnected, reconnecting, disabled
    pub telemetry_status: String,
    pub telemetry_reconnects: u32,
    /// dernier statut du pont MQTT côté backend
    pub broker: BrokerStatus,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    reconnects: Arc<AtomicU32>,
    status: Arc<Mutex<String>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            reconnects: Arc::new(AtomicU32::new(0)),
            status: Arc::new(Mutex::new("connecting".to_string())),
        }
    }

    fn set_status(&self, status: &str) {
        *self.status.lock() = status.to_string();
    }

    pub fn mark_mqtt_connected(&self) {
        self.set_status("connected");
    }

    pub fn mark_mqtt_disconnected(&self) {
        self.set_status("disconnected");
    }

    /// Pas de broker configuré
    pub fn mark_mqtt_disabled(&self) {
        self.set_status("disabled");
    }

    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        self.set_status("reconnecting");
    }

    pub fn get_health(&self, cranes_tracked: usize, broker: BrokerStatus) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            cranes_tracked: u32::try_from(cranes_tracked).unwrap_or(u32::MAX),
            telemetry_status: self.status.lock().clone(),
            telemetry_reconnects: self.reconnects.load(Ordering::Relaxed),
            broker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let tracker = HealthTracker::new();
        let clone = tracker.clone();
        assert_eq!(tracker.get_health(0, BrokerStatus::default()).telemetry_status, "connecting");

        clone.increment_reconnects();
        clone.increment_reconnects();
        let health = tracker.get_health(3, BrokerStatus::failed());
        assert_eq!(health.telemetry_status, "reconnecting");
        assert_eq!(health.telemetry_reconnects, 2);
        assert_eq!(health.cranes_tracked, 3);
        assert_eq!(health.broker.broker, "Error");

        tracker.mark_mqtt_connected();
        assert_eq!(clone.get_health(0, BrokerStatus::default()).telemetry_status, "connected");
    }
}
