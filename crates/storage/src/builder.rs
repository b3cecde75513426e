use std::time::Duration;

use sea_orm::{ConnectOptions, Database};
use wallet_ledger_domain::storage::{StorageError, StorageResult};

use crate::{migration::run_migrations, SeaOrmStorage};

#[derive(Default)]
pub struct StorageBuilder {
    database_url: Option<String>,
    max_connections: Option<u32>,
    connect_timeout: Option<Duration>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max.max(1));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub async fn build(self) -> StorageResult<SeaOrmStorage> {
        let url = self
            .database_url
            .ok_or_else(|| StorageError::Database("missing database url".into()))?;
        let mut options = ConnectOptions::new(url);
        if let Some(max) = self.max_connections {
            options.max_connections(max);
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout(timeout);
        }
        options.sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(SeaOrmStorage::from_connection(db))
    }
}
