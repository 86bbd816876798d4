use std::sync::Arc;

use super::{
    config::Config,
    database::{MongoNoteStore, NoteStore, init_mongo},
    error::ServerError,
    rate_limit::{RateLimit, init_rate_limiter},
};

pub struct State {
    pub config: Config,
    pub notes: Arc<dyn NoteStore>,
    pub limiter: Option<Arc<dyn RateLimit>>,
}

impl State {
    /// Storage must connect before anything else is set up; the limiter is
    /// optional and never fails startup.
    pub async fn new(config: Config) -> Result<Arc<Self>, ServerError> {
        let database = init_mongo(&config.mongo_uri, &config.mongo_db).await?;
        let notes = Arc::new(MongoNoteStore::new(&database));

        let limiter = init_rate_limiter(&config.rate_limit).await;

        Ok(Self::from_parts(config, notes, limiter))
    }

    pub fn from_parts(
        config: Config,
        notes: Arc<dyn NoteStore>,
        limiter: Option<Arc<dyn RateLimit>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            notes,
            limiter,
        })
    }
}
