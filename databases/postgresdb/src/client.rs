//! Thin wrapper around one tokio-postgres session.

use std::sync::Arc;

use tokio_postgres::{Client, NoTls};

use crate::store::StoreError;

/// Shared handle to a Postgres session. The wire connection is driven by
/// a background task for the life of the client.
#[derive(Clone)]
pub struct PostgresClient {
    client: Arc<Client>,
}

impl PostgresClient {
    pub async fn connect(pg_url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(pg_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("postgres connection error: {e}");
            }
        });

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64, StoreError> {
        Ok(self.client.execute(sql, params).await?)
    }
}
