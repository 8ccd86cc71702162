use crate::services::ObservationStore;
use axum::extract::FromRef;
use std::fmt;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ObservationStore>;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
}

impl AppState {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish()
    }
}

impl FromRef<AppState> for StoreHandle {
    fn from_ref(app: &AppState) -> Self {
        app.store.clone()
    }
}
