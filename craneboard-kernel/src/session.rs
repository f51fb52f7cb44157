//! Fournisseur de session : clé API → utilisateur. Lecture seule ici.

use std::collections::HashMap;

use crate::models::User;

pub trait SessionProvider: Send + Sync {
    fn user_for_key(&self, api_key: &str) -> Option<User>;
}

/// Sessions déclarées dans la config (`sessions:`)
pub struct StaticSessions {
    users: HashMap<String, User>,
}

impl StaticSessions {
    pub fn new(users: HashMap<String, User>) -> Self {
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl SessionProvider for StaticSessions {
    fn user_for_key(&self, api_key: &str) -> Option<User> {
        if api_key.is_empty() {
            return None;
        }
        self.users.get(api_key).cloned()
    }
}
