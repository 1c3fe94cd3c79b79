use std::sync::Arc;

use crate::infra::{
    auth::{CredentialVerifier, JwtVerifier},
    config::Config,
    db::{self, DbPool},
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub config: Arc<Config>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

impl AppState {
    pub async fn init(config: Config) -> anyhow::Result<Self> {
        let db_pool = db::create_pool(&config.database).await?;
        let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));

        Ok(Self {
            db_pool,
            config: Arc::new(config),
            verifier,
        })
    }
}
