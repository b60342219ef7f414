use std::sync::Arc;

use axum::extract::FromRef;

use crate::{codec::BodyLimit, store::MovieStore};

#[derive(Clone)]
pub struct AppState {
    pub movies: Arc<dyn MovieStore>,
    pub body_limit: BodyLimit,
}

impl AppState {
    pub fn new(movies: Arc<dyn MovieStore>) -> Self {
        Self {
            movies,
            body_limit: BodyLimit::default(),
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = BodyLimit(limit);
        self
    }
}

impl FromRef<AppState> for BodyLimit {
    fn from_ref(state: &AppState) -> Self {
        state.body_limit
    }
}
