//! État du tableau de bord piloté par événements typés.
//!
//! Les composants enfants émettent un `DashboardEvent`, le conteneur le
//! réduit en un nouvel état (`reduce`). Le passage de sélection vers la
//! page analytics passe par `SelectionHandoff`, lu une seule fois.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::state::{new_state, Shared};

/// JSON : `{"type": "craneSelected", "craneId": "TC-1"}`, `{"type": "viewToggled"}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "craneId", rename_all = "camelCase")]
pub enum DashboardEvent {
    CraneSelected(String),
    SelectionCleared,
    ViewToggled,
    CardToggled(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    Map,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub selected: Option<String>,
    pub view: ViewMode,
    /// cartes dépliées (vue détaillée)
    pub expanded: BTreeSet<String>,
}

pub fn reduce(mut state: DashboardState, event: DashboardEvent) -> DashboardState {
    match event {
        DashboardEvent::CraneSelected(id) => state.selected = Some(id),
        DashboardEvent::SelectionCleared => state.selected = None,
        DashboardEvent::ViewToggled => {
            state.view = match state.view {
                ViewMode::Grid => ViewMode::Map,
                ViewMode::Map => ViewMode::Grid,
            }
        }
        DashboardEvent::CardToggled(id) => {
            if !state.expanded.remove(&id) {
                state.expanded.insert(id);
            }
        }
    }
    state
}

/// Emplacement de session : une grue cliquée sur le tableau de bord,
/// consommée à l'ouverture de la page analytics
#[derive(Clone)]
pub struct SelectionHandoff {
    slot: Shared<Option<String>>,
}

impl Default for SelectionHandoff {
    fn default() -> Self {
        Self { slot: new_state(None) }
    }
}

impl SelectionHandoff {
    pub fn put(&self, crane_id: impl Into<String>) {
        *self.slot.lock() = Some(crane_id.into());
    }

    /// Lit puis vide
    pub fn take(&self) -> Option<String> {
        self.slot.lock().take()
    }
}
