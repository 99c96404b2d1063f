use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn},
    upload::ImageHost,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub images: Arc<dyn ImageHost>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(orm: OrmConn, images: Arc<dyn ImageHost>, config: AppConfig) -> Self {
        let pool = orm.get_postgres_connection_pool().clone();
        Self {
            pool,
            orm,
            images,
            config: Arc::new(config),
        }
    }
}
