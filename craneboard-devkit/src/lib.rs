/*!
# Craneboard DevKit - Outils de test du kernel

Bibliothèque facilitant les tests d'intégration avec:
- Fixtures JSON au format du backend grues
- Mock HTTP scripté du backend (grues, analytics, statut broker, géocodage)
*/

pub mod fixtures;
pub mod mock_api;

pub use fixtures::CraneFixture;
pub use mock_api::MockCraneApi;
