use serde::Serialize;
use std::collections::BTreeMap;

use crate::format::{format_last_seen, format_load, format_utilization, status_config, StatusConfig};
use crate::models::{Crane, LimitSwitch, SwitchStatus};

/// Tout ce qu'affiche une carte de statut, dérivé une fois par grue
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CraneCard {
    pub crane_id: String,
    pub display_name: String,
    pub location: String,
    pub online: bool,
    pub status: StatusConfig,
    pub load: String,
    pub utilization: String,
    pub last_seen: String,
    pub wind_speed: String,
    pub tickets: u64,
    pub limit_switches: BTreeMap<LimitSwitch, SwitchStatus>,
    pub failing_switches: Vec<LimitSwitch>,
}

impl CraneCard {
    pub fn from_crane(crane: &Crane) -> Self {
        let limit_switches: BTreeMap<_, _> = LimitSwitch::ALL
            .into_iter()
            .map(|ls| (ls, crane.last_status_raw.switch(ls)))
            .collect();
        let failing_switches = limit_switches
            .iter()
            .filter(|(_, status)| **status == SwitchStatus::Fail)
            .map(|(ls, _)| *ls)
            .collect();

        Self {
            crane_id: crane.crane_id.clone(),
            display_name: crane.display_name().to_string(),
            location: crane.location.clone().unwrap_or_default(),
            online: crane.online,
            status: status_config(crane),
            load: format_load(crane.current_load, crane.swl),
            utilization: format_utilization(crane.utilization),
            last_seen: format_last_seen(crane.last_seen),
            wind_speed: format_wind_speed(crane.wind_speed),
            tickets: crane.tickets.as_ref().map(|t| t.total).unwrap_or(0),
            limit_switches,
            failing_switches,
        }
    }
}

fn format_wind_speed(wind_speed: Option<f64>) -> String {
    match wind_speed.filter(|v| v.is_finite()) {
        Some(v) => format!("{:.1} m/s", v),
        None => "N/A".to_string(),
    }
}
