/**
 * VUE ANALYTICS - Conteneur de la page analytics
 *
 * RÔLE :
 * Garde la liste des grues visibles (rafraîchie toutes les 10 s), la grue
 * sélectionnée et ses analytics.
 *
 * FONCTIONNEMENT :
 * - Activation : reprend la grue transmise par `SelectionHandoff`, un premier
 *   refresh immédiat, puis un refresh par période (premier tick différé)
 * - Refresh : liste filtrée par rôle ; sélection conservée si toujours visible,
 *   sinon première grue ; analytics de la sélection rechargées
 * - Échec réseau sur la liste : on garde la liste précédente
 * - Requêtes analytics concurrentes : chaque requête porte une génération ;
 *   une réponse pour une grue qui n'est plus sélectionnée, ou plus ancienne
 *   que la dernière appliquée, est jetée ; `loadingAnalytics` retombe dès
 *   qu'aucune requête plus récente n'est en vol
 */

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::api::{ApiError, CraneSource};
use crate::dashboard::SelectionHandoff;
use crate::models::{Crane, CraneAnalytics, User};
use crate::poller::{spawn_periodic_after, PollHandle};
use crate::roles::visible_cranes;
use crate::state::{new_state, Shared};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub cranes: Vec<Crane>,
    pub selected: Option<String>,
    pub analytics: Option<CraneAnalytics>,
    pub loading_analytics: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_refresh: Option<OffsetDateTime>,
}

#[derive(Default)]
struct Inner {
    snapshot: AnalyticsSnapshot,
    /// numéro de la dernière requête analytics lancée
    generation: u64,
    /// numéro de la dernière réponse appliquée
    applied: u64,
}

#[derive(Clone)]
pub struct AnalyticsView {
    source: Arc<dyn CraneSource>,
    user: User,
    limit: u32,
    inner: Shared<Inner>,
}

impl AnalyticsView {
    pub fn new(source: Arc<dyn CraneSource>, user: User, limit: u32) -> Self {
        Self { source, user, limit, inner: new_state(Inner::default()) }
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.inner.lock().snapshot.clone()
    }

    /// Même état partagé (clones d'une même vue)
    pub fn same_view(&self, other: &AnalyticsView) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Reprend la sélection transmise, rafraîchit une fois puis toutes les `period`
    pub async fn activate(&self, handoff: &SelectionHandoff, period: Duration) -> PollHandle {
        if let Some(id) = handoff.take() {
            debug!("analytics view opened on {}", id);
            self.inner.lock().snapshot.selected = Some(id);
        }
        if let Err(e) = self.refresh().await {
            warn!("initial crane list refresh failed: {}", e);
        }
        let view = self.clone();
        spawn_periodic_after("cranes-refresh", period, move || {
            let view = view.clone();
            async move {
                if let Err(e) = view.refresh().await {
                    warn!("crane list refresh failed, keeping previous list: {}", e);
                }
            }
        })
    }

    pub async fn refresh(&self) -> Result<(), ApiError> {
        let cranes = visible_cranes(&self.source.list_cranes(self.limit).await?, &self.user);

        let selected = {
            let mut inner = self.inner.lock();
            let snap = &mut inner.snapshot;
            let still_visible = snap
                .selected
                .as_ref()
                .is_some_and(|id| cranes.iter().any(|c| &c.crane_id == id));
            if !still_visible {
                snap.selected = cranes.first().map(|c| c.crane_id.clone());
                snap.analytics = None;
            }
            if snap.selected.is_none() {
                snap.loading_analytics = false;
            }
            snap.cranes = cranes;
            snap.last_refresh = Some(OffsetDateTime::now_utc());
            snap.selected.clone()
        };

        if let Some(id) = selected {
            self.load_analytics(&id).await;
        }
        Ok(())
    }

    /// Sélectionne une grue visible ; `false` si elle ne l'est pas
    pub async fn select(&self, crane_id: &str) -> bool {
        {
            let mut inner = self.inner.lock();
            let snap = &mut inner.snapshot;
            if !snap.cranes.iter().any(|c| c.crane_id == crane_id) {
                return false;
            }
            if snap.selected.as_deref() != Some(crane_id) {
                snap.selected = Some(crane_id.to_string());
                snap.analytics = None;
            }
        }
        self.load_analytics(crane_id).await;
        true
    }

    async fn load_analytics(&self, crane_id: &str) {
        let (generation, crane) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            let crane = inner.snapshot.cranes.iter().find(|c| c.crane_id == crane_id).cloned();
            if crane.is_some() {
                inner.snapshot.loading_analytics = true;
            }
            (inner.generation, crane)
        };
        let Some(crane) = crane else {
            self.inner.lock().snapshot.loading_analytics = false;
            return;
        };

        let analytics = self.source.crane_analytics(&crane).await;

        let mut inner = self.inner.lock();
        // sélection changée entre-temps, ou réponse plus récente déjà appliquée
        let still_selected = inner.snapshot.selected.as_deref() == Some(crane.crane_id.as_str());
        if !still_selected || generation < inner.applied {
            debug!("discarding superseded analytics for {}", crane.crane_id);
            if generation == inner.generation {
                inner.snapshot.loading_analytics = false;
            }
            return;
        }
        inner.applied = generation;
        inner.snapshot.analytics = Some(analytics);
        inner.snapshot.loading_analytics = false;
    }
}
