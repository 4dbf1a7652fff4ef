//! database (db) union structure.
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool, Postgres, Transaction};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "cba";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections.
    ///
    /// A connection is opened and pinged straight away, so an unreachable
    /// server fails here rather than on the first request.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        let database = Self::from_pool(postgres);
        database.ping().await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(database)
    }

    /// Wrap an already established pool.
    pub fn from_pool(postgres: PgPool) -> Self {
        Self { postgres }
    }

    /// Check that the server answers.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.postgres.acquire().await?.ping().await
    }

    /// Open a new transaction.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.postgres.begin().await
    }

    /// Wait for every connection to be returned, then close them.
    pub async fn close(&self) {
        self.postgres.close().await;
        tracing::info!("postgres connections closed");
    }
}
