use parking_lot::Mutex;
use std::sync::Arc;

use crate::models::Crane;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Dernière liste de grues connue (remplacée à chaque refresh API,
/// patchée entre deux refresh par la télémétrie live)
pub type CraneCache = Vec<Crane>;
