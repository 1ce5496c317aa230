// src/app_state.rs

use crate::config::Config;
use crate::db::MongoDB;
use crate::storage::FileStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub mongodb: Arc<MongoDB>,
    pub config: Config,
    pub files: FileStore,
}
