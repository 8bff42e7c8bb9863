use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::models::{
    focus::{DateRange, FocusTotals, Period},
    task::{Pagination, Task, TaskQuery},
    user::User,
};

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryTaskStore, InMemoryUserStore};
pub use sqlite::{SqliteTaskStore, SqliteUserStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("store call exceeded {0:?}")]
    Timeout(Duration),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<User, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError>;

    /// Insert a new user. A taken username is a `Conflict`.
    async fn create(&self, user: User) -> Result<User, StoreError>;

    /// Replace the whole stored document for `user.id`.
    async fn update(&self, user: &User) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: Task) -> Result<Task, StoreError>;

    async fn get(&self, id: &str) -> Result<Task, StoreError>;

    async fn update(&self, task: &Task) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Matching tasks for a user plus the unpaginated match count.
    /// Without `page` every match is returned.
    async fn list(
        &self,
        user_id: &str,
        query: &TaskQuery,
        page: Option<Pagination>,
    ) -> Result<(Vec<Task>, u64), StoreError>;

    /// Duration sums over `range`, grouped by the raw key of `group_by`
    /// (see [`Period::raw_key`]). Keys are passed through as the backend produces them.
    async fn sum_duration_grouped(
        &self,
        user_id: &str,
        range: DateRange,
        group_by: Period,
        finished_only: bool,
    ) -> Result<Vec<(String, i64)>, StoreError>;

    async fn focus_totals(
        &self,
        user_id: &str,
        range: Option<DateRange>,
    ) -> Result<FocusTotals, StoreError>;
}

/// Run a store call, giving up after `limit`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserStore::new()),
            tasks: Arc::new(InMemoryTaskStore::new()),
        }
    }
}

pub async fn create_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.store_backend {
        StoreBackend::Sqlite => {
            info!("Using SQLite storage backend");
            let pool = sqlite::create_db_pool(&config.database_url).await?;
            Ok(Stores {
                users: Arc::new(SqliteUserStore::new(pool.clone(), config.store_timeout)),
                tasks: Arc::new(SqliteTaskStore::new(pool, config.store_timeout)),
            })
        }
        StoreBackend::Memory => {
            info!("Using in-memory storage backend");
            Ok(Stores::in_memory())
        }
    }
}
