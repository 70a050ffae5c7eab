use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::task::JoinHandle;

use crate::auth::TokenIssuer;
use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::repository::SqliteRecordStore;
use crate::fanout::{spawn_dispatcher, Hub, Publisher};
use crate::records::Records;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub records: Records,
    pub hub: Hub,
    pub publisher: Publisher,
    pub tokens: Arc<TokenIssuer>,
}

impl AppState {
    /// Wire up the store, cache, hub and dispatcher over an open pool.
    /// Must be called from within a Tokio runtime.
    pub fn new(db: DbPool, config: Config) -> (Self, JoinHandle<()>) {
        let records = Records::new(
            Arc::new(SqliteRecordStore::new(db.clone())),
            Arc::new(MemoryCache::new()),
        );
        let hub = Hub::new(config.stream.session_buffer);
        let (publisher, dispatcher) = spawn_dispatcher(hub.clone(), config.stream.dispatch_buffer);
        let tokens = Arc::new(TokenIssuer::from_config(&config.auth));

        let state = Self {
            db,
            config,
            records,
            hub,
            publisher,
            tokens,
        };
        (state, dispatcher)
    }
}
