use std::sync::Arc;

use crate::catalog::Catalog;
use crate::orders::OrderIntake;
use crate::store::RecordStore;
use crate::submissions::Submissions;

/// Everything the handlers need, shared across actix workers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub orders: OrderIntake,
    pub submissions: Submissions,
    pub records: Arc<dyn RecordStore>,
    pub media_url: String,
    pub max_upload_bytes: usize,
}
