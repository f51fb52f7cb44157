/*!
 * CRANEBOARD KERNEL - Couche données du tableau de bord grues à tour
 *
 * Modèles et formatage, client API, pollers, résolution des positions,
 * visibilité par rôle, conteneurs de vues et surface HTTP.
 */

pub mod analytics;
pub mod api;
pub mod cards;
pub mod config;
pub mod dashboard;
pub mod fleet;
pub mod format;
pub mod health;
pub mod http;
pub mod location;
pub mod map;
pub mod models;
pub mod notify;
pub mod poller;
pub mod roles;
pub mod session;
pub mod state;
pub mod status;
pub mod telemetry;
