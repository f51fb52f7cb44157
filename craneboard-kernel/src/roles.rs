//! Visibilité par rôle, capacités et navigation.
//!
//! Sur les écrans grues : admin voit tout, manager ne voit que ses grues
//! assignées, tout autre rôle ne voit rien. Les écrans privilégiés
//! redirigent au lieu de lever une erreur.

use serde::Serialize;

use crate::models::{Crane, Role, User};

impl User {
    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn can_view_assets(&self) -> bool {
        self.has_role(&[Role::Admin, Role::Manager, Role::Superadmin])
    }

    pub fn can_view_analytics(&self) -> bool {
        self.has_role(&[Role::Admin, Role::Manager])
    }

    pub fn can_manage_users(&self) -> bool {
        self.has_role(&[Role::Admin, Role::Superadmin])
    }

    pub fn can_see_crane(&self, crane_id: &str) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Manager => self.assigned_cranes.contains(crane_id),
            _ => false,
        }
    }
}

/// Filtre pur et stable : l'ordre d'entrée est conservé
pub fn visible_cranes(cranes: &[Crane], user: &User) -> Vec<Crane> {
    cranes
        .iter()
        .filter(|c| user.can_see_crane(&c.crane_id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    Analytics,
    Map,
    Users,
    Settings,
}

impl Screen {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dashboard" => Some(Self::Dashboard),
            "analytics" => Some(Self::Analytics),
            "map" => Some(Self::Map),
            "users" => Some(Self::Users),
            "settings" => Some(Self::Settings),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenAccess {
    Granted,
    Redirect(&'static str),
}

pub const HOME_PATH: &str = "/dashboard";

pub fn screen_access(user: &User, screen: Screen) -> ScreenAccess {
    let allowed = match screen {
        Screen::Dashboard | Screen::Analytics | Screen::Map => true,
        Screen::Users => user.can_manage_users(),
        Screen::Settings => user.has_role(&[Role::Admin, Role::Superadmin]),
    };
    if allowed {
        ScreenAccess::Granted
    } else {
        ScreenAccess::Redirect(HOME_PATH)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
}

const fn nav(label: &'static str, path: &'static str) -> NavItem {
    NavItem { label, path }
}

/// Entrées de la barre latérale, dans l'ordre d'affichage
pub fn navigation(role: Role) -> Vec<NavItem> {
    let mut items = vec![nav("Dashboard", HOME_PATH)];
    match role {
        Role::Admin | Role::Manager => {
            items.push(nav("Cranes", "/cranes"));
            items.push(nav("Map", "/map"));
            items.push(nav("Analytics", "/analytics"));
            items.push(nav("Tickets", "/tickets"));
        }
        Role::Supervisor | Role::Operator => {
            items.push(nav("Tickets", "/tickets"));
        }
        Role::Superadmin => {
            items.push(nav("Companies", "/companies"));
        }
    }
    if matches!(role, Role::Admin | Role::Superadmin) {
        items.push(nav("Users", "/users"));
        items.push(nav("Settings", "/settings"));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn user(role: Role, assigned: &[&str]) -> User {
        User {
            name: "test".into(),
            email: "test@example.com".into(),
            role,
            assigned_cranes: assigned.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn cranes(ids: &[&str]) -> Vec<Crane> {
        ids.iter().map(|id| Crane::new(*id)).collect()
    }

    fn ids(list: &[Crane]) -> Vec<&str> {
        list.iter().map(|c| c.crane_id.as_str()).collect()
    }

    #[test]
    fn test_admin_sees_everything_and_filter_is_idempotent() {
        let admin = user(Role::Admin, &[]);
        let all = cranes(&["TC-1", "TC-2", "TC-3"]);
        let once = visible_cranes(&all, &admin);
        let twice = visible_cranes(&once, &admin);
        assert_eq!(once, all);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_manager_sees_assigned_only_in_order() {
        let manager = user(Role::Manager, &["TC-3", "TC-1"]);
        let out = visible_cranes(&cranes(&["TC-1", "TC-2", "TC-3"]), &manager);
        assert_eq!(ids(&out), vec!["TC-1", "TC-3"]);
    }

    #[test]
    fn test_other_roles_see_nothing() {
        let all = cranes(&["TC-1", "TC-2"]);
        for role in [Role::Supervisor, Role::Operator, Role::Superadmin] {
            assert!(visible_cranes(&all, &user(role, &["TC-1"])).is_empty(), "{role:?}");
        }
    }

    #[test]
    fn test_single_crane_end_to_end() {
        let mut crane = Crane::new("TC-1");
        crane.online = true;
        crane.swl = Some(50.0);
        crane.current_load = Some(25.0);
        let out = visible_cranes(&[crane], &user(Role::Admin, &[]));
        assert_eq!(out.len(), 1);
        assert_eq!(crate::format::format_load(out[0].current_load, out[0].swl), "0.0T - 0.1T");
    }

    #[test]
    fn test_privileged_screens_redirect() {
        let operator = user(Role::Operator, &[]);
        assert_eq!(screen_access(&operator, Screen::Users), ScreenAccess::Redirect(HOME_PATH));
        assert_eq!(screen_access(&operator, Screen::Map), ScreenAccess::Granted);
        assert_eq!(screen_access(&user(Role::Admin, &[]), Screen::Settings), ScreenAccess::Granted);
    }

    #[test]
    fn test_capabilities() {
        let manager = user(Role::Manager, &[]);
        assert!(manager.can_view_assets());
        assert!(manager.can_view_analytics());
        assert!(!manager.can_manage_users());
        assert!(user(Role::Superadmin, &[]).can_manage_users());
        assert!(!user(Role::Operator, &[]).can_view_assets());
    }

    #[test]
    fn test_navigation_by_role() {
        let paths = |role| navigation(role).into_iter().map(|n| n.path).collect::<Vec<_>>();
        assert_eq!(paths(Role::Operator), vec!["/dashboard", "/tickets"]);
        assert!(paths(Role::Manager).contains(&"/analytics"));
        assert!(!paths(Role::Manager).contains(&"/users"));
        assert_eq!(paths(Role::Admin).last(), Some(&"/settings"));
    }
}
