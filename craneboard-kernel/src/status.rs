//! Statut de connectivité du pont MQTT (`GET /api/mqtt/status`).
//!
//! Une requête à l'activation puis une toutes les 10 s. Un échec donne
//! `{connected: false, broker: "Error", loading: false}` et la boucle continue.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::StatusSource;
use crate::models::BrokerStatus;
use crate::poller::{spawn_periodic, PollHandle};

pub fn spawn_status_poller(
    source: Arc<dyn StatusSource>,
    period: Duration,
) -> (watch::Receiver<BrokerStatus>, PollHandle) {
    let (tx, rx) = watch::channel(BrokerStatus::default());
    let tx = Arc::new(tx);

    let handle = spawn_periodic("mqtt-status", period, move || {
        let source = source.clone();
        let tx = tx.clone();
        async move {
            let status = match source.mqtt_status().await {
                Ok(status) => {
                    debug!("broker {} connected={}", status.broker, status.connected);
                    BrokerStatus::from(status)
                }
                Err(e) => {
                    warn!("mqtt status request failed: {}", e);
                    BrokerStatus::failed()
                }
            };
            tx.send_replace(status);
        }
    });
    (rx, handle)
}
