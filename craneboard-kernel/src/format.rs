//! Dérivations d'affichage : charge, utilisation, dernière activité, statut.
//!
//! Fonctions pures et totales : aucun champ optionnel absent ou mal formé
//! ne fait échouer l'appel.

use serde::Serialize;
use time::OffsetDateTime;

use crate::models::Crane;

/// `"{charge}T - {swl}T"`, valeurs reçues en kg, une décimale.
/// La division par 1000 s'applique toujours, même aux petites valeurs.
pub fn format_load(current_load: Option<f64>, swl: Option<f64>) -> String {
    let load_tons = finite_or_zero(current_load) / 1000.0;
    let swl_tons = finite_or_zero(swl) / 1000.0;
    format!("{:.1}T - {:.1}T", load_tons, swl_tons)
}

/// `"{h}h {m}m"` à partir d'un nombre de minutes
pub fn format_utilization(minutes: Option<f64>) -> String {
    let total = finite_or_zero(minutes).max(0.0).floor() as u64;
    format!("{}h {}m", total / 60, total % 60)
}

/// Durée relative depuis la dernière remontée, calculée à l'instant de l'appel
pub fn format_last_seen(last_seen: Option<OffsetDateTime>) -> String {
    format_last_seen_at(last_seen, OffsetDateTime::now_utc())
}

pub fn format_last_seen_at(last_seen: Option<OffsetDateTime>, now: OffsetDateTime) -> String {
    let Some(ts) = last_seen else {
        return "Never".to_string();
    };
    let minutes = (now - ts).whole_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 60 * 24 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / (60 * 24))
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

// ===== Classification =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CraneStatus {
    Offline,
    Overload,
    Warning,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Gray,
    Red,
    Yellow,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusConfig {
    pub status: CraneStatus,
    pub color: StatusColor,
}

impl CraneStatus {
    pub fn color(self) -> StatusColor {
        match self {
            Self::Offline => StatusColor::Gray,
            Self::Overload => StatusColor::Red,
            Self::Warning => StatusColor::Yellow,
            Self::Normal => StatusColor::Green,
        }
    }
}

/// Priorité : hors ligne > surcharge > fin de course en défaut > normal
pub fn status_config(crane: &Crane) -> StatusConfig {
    let status = if !crane.online {
        CraneStatus::Offline
    } else if crane.overloaded() {
        CraneStatus::Overload
    } else if crane.last_status_raw.any_failed() {
        CraneStatus::Warning
    } else {
        CraneStatus::Normal
    };
    StatusConfig { status, color: status.color() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTag {
    Low,
    Medium,
    High,
    Critical,
    Neutral,
}

pub fn severity_color(severity: &str) -> SeverityTag {
    match severity.trim().to_ascii_lowercase().as_str() {
        "low" => SeverityTag::Low,
        "medium" => SeverityTag::Medium,
        "high" => SeverityTag::High,
        "critical" => SeverityTag::Critical,
        _ => SeverityTag::Neutral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LimitSwitch, SwitchStatus};
    use time::Duration;

    #[test]
    fn test_format_load() {
        assert_eq!(format_load(Some(5000.0), Some(10000.0)), "5.0T - 10.0T");
        assert_eq!(format_load(None, Some(2000.0)), "0.0T - 2.0T");
        assert_eq!(format_load(Some(f64::NAN), None), "0.0T - 0.0T");
    }

    #[test]
    fn test_format_load_always_divides_by_thousand() {
        assert_eq!(format_load(Some(25.0), Some(50.0)), "0.0T - 0.1T");
    }

    #[test]
    fn test_format_utilization() {
        assert_eq!(format_utilization(Some(125.0)), "2h 5m");
        assert_eq!(format_utilization(Some(0.0)), "0h 0m");
        assert_eq!(format_utilization(None), "0h 0m");
        assert_eq!(format_utilization(Some(59.9)), "0h 59m");
        assert_eq!(format_utilization(Some(-30.0)), "0h 0m");
    }

    #[test]
    fn test_format_last_seen_thresholds() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(format_last_seen_at(None, now), "Never");
        assert_eq!(format_last_seen_at(Some(now - Duration::seconds(30)), now), "Just now");
        assert_eq!(format_last_seen_at(Some(now + Duration::seconds(90)), now), "Just now");
        assert_eq!(format_last_seen_at(Some(now - Duration::minutes(59)), now), "59m ago");
        assert_eq!(format_last_seen_at(Some(now - Duration::minutes(60)), now), "1h ago");
        assert_eq!(format_last_seen_at(Some(now - Duration::hours(25)), now), "1d ago");
    }

    #[test]
    fn test_format_last_seen_uses_wall_clock() {
        let ts = OffsetDateTime::now_utc() - Duration::seconds(30);
        assert_eq!(format_last_seen(Some(ts)), "Just now");
    }

    #[test]
    fn test_offline_wins_over_everything() {
        let mut crane = Crane::new("TC-1");
        crane.is_overloaded = Some(true);
        crane.last_status_raw.set_switch(LimitSwitch::Ls2, SwitchStatus::Fail);
        let cfg = status_config(&crane);
        assert_eq!(cfg.status, CraneStatus::Offline);
        assert_eq!(cfg.color, StatusColor::Gray);
    }

    #[test]
    fn test_overload_wins_over_failed_switch() {
        let mut crane = Crane::new("TC-1");
        crane.online = true;
        crane.is_overloaded = Some(true);
        crane.last_status_raw.set_switch(LimitSwitch::Ls1, SwitchStatus::Fail);
        assert_eq!(status_config(&crane).status, CraneStatus::Overload);
        assert_eq!(status_config(&crane).color, StatusColor::Red);
    }

    #[test]
    fn test_warning_and_normal() {
        let mut crane = Crane::new("TC-1");
        crane.online = true;
        assert_eq!(status_config(&crane).status, CraneStatus::Normal);

        crane.last_status_raw.set_switch(LimitSwitch::Ls4, SwitchStatus::Unknown);
        assert_eq!(status_config(&crane).status, CraneStatus::Normal);

        crane.last_status_raw.set_switch(LimitSwitch::Ls4, SwitchStatus::Fail);
        let cfg = status_config(&crane);
        assert_eq!(cfg.status, CraneStatus::Warning);
        assert_eq!(cfg.color, StatusColor::Yellow);
    }

    #[test]
    fn test_severity_color() {
        assert_eq!(severity_color("critical"), SeverityTag::Critical);
        assert_eq!(severity_color(" High "), SeverityTag::High);
        assert_eq!(severity_color("catastrophic"), SeverityTag::Neutral);
        assert_eq!(severity_color(""), SeverityTag::Neutral);
    }
}
