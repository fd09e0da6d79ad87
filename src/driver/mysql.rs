use async_trait::async_trait;
use fieldx::fxstruct;
use sea_orm::ConnectionTrait;
use sea_orm::DatabaseConnection;

use crate::config::StoreConfig;
use crate::error::Result;

use super::connect_options;
use super::split_mysql_uri;
use super::DatabaseDriver;

#[derive(Debug)]
#[fxstruct(sync, no_new, get)]
pub struct Mysql {
    schema:     String,
    #[fieldx(get(off))]
    connection: DatabaseConnection,
}

impl Mysql {
    /// Connect to the server, create the schema if it doesn't exist yet and reconnect to the schema.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let (server, schema) = split_mysql_uri(config.uri())?;

        {
            let server_conn = sea_orm::Database::connect(connect_options(config, server))
                .await
                .inspect_err(|e| tracing::error!("Error connecting to MySQL server: {e}"))?;
            server_conn
                .execute_unprepared(&format!(
                    "CREATE SCHEMA IF NOT EXISTS `{schema}` DEFAULT CHARACTER SET utf8mb4"
                ))
                .await?;
        }

        let connection = sea_orm::Database::connect(connect_options(config, config.uri().clone()))
            .await
            .inspect_err(|e| tracing::error!("Error connecting to MySQL schema {schema}: {e}"))?;

        Ok(Self { schema, connection })
    }
}

#[async_trait]
impl DatabaseDriver for Mysql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    async fn configure(&self) -> Result<()> {
        Ok(())
    }

    async fn checkpoint(&self) -> Result<()> {
        Ok(())
    }
}
