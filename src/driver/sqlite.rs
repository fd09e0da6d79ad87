use async_trait::async_trait;
use fieldx::fxstruct;
use sea_orm::ConnectionTrait;
use sea_orm::DatabaseConnection;

use crate::config::StoreConfig;
use crate::error::Result;

use super::connect_options;
use super::DatabaseDriver;

#[derive(Debug)]
#[fxstruct(sync, no_new)]
pub struct Sqlite {
    connection: DatabaseConnection,
    in_memory:  bool,
}

impl Sqlite {
    /// Open the database file named by the configured URI, creating it if missing. `sqlite:` URLs are used as is.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let uri = config.uri();
        let in_memory = uri.contains(":memory:") || uri.contains("mode=memory");
        let url = if uri.starts_with("sqlite:") {
            uri.clone()
        }
        else {
            format!("sqlite://{uri}?mode=rwc")
        };

        let mut opts = connect_options(config, url);
        if in_memory {
            // Every connection would get a database of its own.
            opts.max_connections(1).min_connections(1);
        }

        let connection = sea_orm::Database::connect(opts)
            .await
            .inspect_err(|e| tracing::error!("Error connecting to database {uri}: {e}"))?;

        Ok(Self { connection, in_memory })
    }
}

#[async_trait]
impl DatabaseDriver for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    async fn configure(&self) -> Result<()> {
        let db = &self.connection;

        db.execute_unprepared("PRAGMA foreign_keys = ON;").await?;
        if !self.in_memory {
            db.execute_unprepared("PRAGMA journal_mode = WAL;").await?;
            db.execute_unprepared("PRAGMA synchronous = NORMAL;").await?;
        }

        Ok(())
    }

    async fn checkpoint(&self) -> Result<()> {
        if !self.in_memory {
            self.connection.execute_unprepared("PRAGMA wal_checkpoint;").await?;
        }

        Ok(())
    }
}

impl AsRef<DatabaseConnection> for Sqlite {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.connection
    }
}
