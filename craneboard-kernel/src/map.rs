//! Marqueurs carte pour un utilisateur.
//!
//! Filtre par rôle puis résolution des positions. Le résultat n'est
//! recalculé que si la liste visible change ; les lieux déjà géocodés ne
//! repartent pas sur le réseau.

use parking_lot::Mutex;

use crate::location::{Geocoder, LocationResolver};
use crate::models::{Crane, ResolvedCraneLocation, User};
use crate::roles::visible_cranes;

pub struct MapView<G> {
    resolver: LocationResolver<G>,
    last: Mutex<Option<(Vec<Crane>, Vec<ResolvedCraneLocation>)>>,
}

impl<G: Geocoder> MapView<G> {
    pub fn new(resolver: LocationResolver<G>) -> Self {
        Self { resolver, last: Mutex::new(None) }
    }

    pub async fn markers(&self, cranes: &[Crane], user: &User) -> Vec<ResolvedCraneLocation> {
        let visible = visible_cranes(cranes, user);
        let cached = self
            .last
            .lock()
            .as_ref()
            .filter(|(input, _)| *input == visible)
            .map(|(_, markers)| markers.clone());
        if let Some(markers) = cached {
            return markers;
        }

        let markers = self.resolver.resolve(&visible).await;
        *self.last.lock() = Some((visible, markers.clone()));
        markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::GeocodeError;
    use crate::models::{LatLng, Role};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingGeocoder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn lookup(&self, _place: &str) -> Result<Option<LatLng>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(LatLng { lat: 10.0, lng: 20.0 }))
        }
    }

    fn city_crane(id: &str, place: &str) -> Crane {
        let mut crane = Crane::new(id);
        crane.location = Some(place.into());
        crane
    }

    fn user(role: Role, assigned: &[&str]) -> User {
        User {
            name: "map".into(),
            email: String::new(),
            role,
            assigned_cranes: assigned.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_recomputes_only_when_input_changes() {
        let geocoder = CountingGeocoder::default();
        let calls = geocoder.calls.clone();
        let view = MapView::new(LocationResolver::new(geocoder));
        let admin = user(Role::Admin, &[]);
        let mut cranes = vec![city_crane("TC-1", "Lyon")];

        assert_eq!(view.markers(&cranes, &admin).await.len(), 1);
        assert_eq!(view.markers(&cranes, &admin).await.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cranes.push(city_crane("TC-2", "Porto"));
        assert_eq!(view.markers(&cranes, &admin).await.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_telemetry_and_other_users_do_not_regeocode() {
        let geocoder = CountingGeocoder::default();
        let calls = geocoder.calls.clone();
        let view = MapView::new(LocationResolver::new(geocoder));
        let admin = user(Role::Admin, &[]);
        let manager = user(Role::Manager, &["TC-2"]);
        let mut cranes = vec![city_crane("TC-1", "Lyon"), city_crane("TC-2", "Porto")];

        assert_eq!(view.markers(&cranes, &admin).await.len(), 2);
        assert_eq!(view.markers(&cranes, &manager).await.len(), 1);
        assert_eq!(view.markers(&cranes, &admin).await.len(), 2);

        cranes[0].online = true;
        let out = view.markers(&cranes, &admin).await;
        assert!(out[0].is_online);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_markers_follow_role_filter() {
        let view = MapView::new(LocationResolver::new(CountingGeocoder::default()));
        let cranes = vec![city_crane("TC-1", "Lyon"), city_crane("TC-2", "Porto")];

        let manager = user(Role::Manager, &["TC-2"]);
        let out = view.markers(&cranes, &manager).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].crane.crane_id, "TC-2");

        assert!(view.markers(&cranes, &user(Role::Operator, &[])).await.is_empty());
    }
}
