use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, sqlite::SqlitePoolOptions};
use tracing::{error, info, instrument};

use crate::db::{StoreError, TaskStore, UserStore, bounded};
use crate::models::{
    focus::{DateRange, FocusTotals, Period},
    task::{Pagination, Task, TaskQuery, TaskSort},
    user::{Permission, Session, User, UserStatus},
};

pub async fn create_db_pool(db_url: &str) -> anyhow::Result<SqlitePool> {
    info!(url = %db_url, "Connecting to SQLite");

    // every connection to an in-memory database is a separate database
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to SQLite");
            e
        })?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    nickname: String,
    email: String,
    phone_number: String,
    password_hash: String,
    status: String,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
    permissions: String,
    access_token: Option<String>,
    access_expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let status = UserStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown user status '{}'", row.status)))?;
        let permissions: BTreeMap<Permission, bool> = serde_json::from_str(&row.permissions)
            .map_err(|e| StoreError::Corrupt(format!("permissions: {}", e)))?;

        let session = match (row.access_token, row.access_expires_at, row.refresh_token) {
            (Some(access_token), Some(access_expires_at), Some(refresh_token)) => Some(Session {
                access_token,
                access_expires_at,
                refresh_token,
            }),
            _ => None,
        };

        Ok(User {
            id: row.id,
            username: row.username,
            nickname: row.nickname,
            email: row.email,
            phone_number: row.phone_number,
            password_hash: row.password_hash,
            status,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
            permissions,
            session,
        })
    }
}

fn permissions_json(user: &User) -> Result<String, StoreError> {
    serde_json::to_string(&user.permissions)
        .map_err(|e| StoreError::Corrupt(format!("permissions: {}", e)))
}

const USER_COLUMNS: &str = "id, username, nickname, email, phone_number, password_hash, status, \
     created_at, last_login_at, permissions, access_token, access_expires_at, refresh_token";

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<User, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row = bounded(self.timeout, async {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(value)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        row.ok_or(StoreError::NotFound("user"))?.try_into()
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &str) -> Result<User, StoreError> {
        self.find_one("id", id).await
    }

    #[instrument(skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.find_one("username", username).await
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create(&self, user: User) -> Result<User, StoreError> {
        let permissions = permissions_json(&user)?;
        let session = user.session.as_ref();

        let result = bounded(self.timeout, async {
            sqlx::query(
                r#"
                INSERT INTO users (id, username, nickname, email, phone_number, password_hash,
                    status, created_at, last_login_at, permissions, access_token,
                    access_expires_at, refresh_token)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.nickname)
            .bind(&user.email)
            .bind(&user.phone_number)
            .bind(&user.password_hash)
            .bind(user.status.as_str())
            .bind(user.created_at)
            .bind(user.last_login_at)
            .bind(&permissions)
            .bind(session.map(|s| s.access_token.as_str()))
            .bind(session.map(|s| s.access_expires_at))
            .bind(session.map(|s| s.refresh_token.as_str()))
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(StoreError::Database(sqlx::Error::Database(db))) if db.is_unique_violation() => {
                Err(StoreError::Conflict("username already exists".into()))
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let permissions = permissions_json(user)?;
        let session = user.session.as_ref();

        let result = bounded(self.timeout, async {
            sqlx::query(
                r#"
                UPDATE users SET username = ?, nickname = ?, email = ?, phone_number = ?,
                    password_hash = ?, status = ?, last_login_at = ?, permissions = ?,
                    access_token = ?, access_expires_at = ?, refresh_token = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.username)
            .bind(&user.nickname)
            .bind(&user.email)
            .bind(&user.phone_number)
            .bind(&user.password_hash)
            .bind(user.status.as_str())
            .bind(user.last_login_at)
            .bind(&permissions)
            .bind(session.map(|s| s.access_token.as_str()))
            .bind(session.map(|s| s.access_expires_at))
            .bind(session.map(|s| s.refresh_token.as_str()))
            .bind(&user.id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }
}

const TASK_COLUMNS: &str = "id, user_id, title, time_range, date, duration_minutes, \
     is_important, description, due_date, place, is_finished, is_delayed, category, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    user_id: String,
    title: String,
    time_range: String,
    date: DateTime<Utc>,
    duration_minutes: i64,
    is_important: bool,
    description: String,
    due_date: Option<DateTime<Utc>>,
    place: String,
    is_finished: bool,
    is_delayed: bool,
    category: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            time_range: row.time_range,
            date: row.date,
            duration_minutes: row.duration_minutes,
            is_important: row.is_important,
            description: row.description,
            due_date: row.due_date,
            place: row.place,
            is_finished: row.is_finished,
            is_delayed: row.is_delayed,
            category: row.category,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Make `%`, `_` and `\` match literally inside a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append the WHERE clause selecting `user_id`'s tasks that match `query`.
fn push_task_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, user_id: &'a str, query: &'a TaskQuery) {
    qb.push(" WHERE user_id = ").push_bind(user_id);
    if let Some(range) = query.range {
        qb.push(" AND date >= ").push_bind(range.start);
        qb.push(" AND date < ").push_bind(range.end);
    }
    if query.unfinished_only {
        qb.push(" AND is_finished = 0");
    }
    if query.important_only {
        qb.push(" AND is_important = 1");
    }
    if let Some(category) = &query.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(needle) = &query.search {
        let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
        qb.push(" AND (LOWER(title) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(description) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(category) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(place) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self, task), fields(user_id = %task.user_id))]
    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        bounded(self.timeout, async {
            sqlx::query(&format!(
                "INSERT INTO tasks ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                TASK_COLUMNS
            ))
            .bind(&task.id)
            .bind(&task.user_id)
            .bind(&task.title)
            .bind(&task.time_range)
            .bind(task.date)
            .bind(task.duration_minutes)
            .bind(task.is_important)
            .bind(&task.description)
            .bind(task.due_date)
            .bind(&task.place)
            .bind(task.is_finished)
            .bind(task.is_delayed)
            .bind(&task.category)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await?;

        Ok(task)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Task, StoreError> {
        let row = bounded(self.timeout, async {
            sqlx::query_as::<_, TaskRow>(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        row.map(Task::from).ok_or(StoreError::NotFound("task"))
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let result = bounded(self.timeout, async {
            sqlx::query(
                r#"
                UPDATE tasks SET title = ?, time_range = ?, date = ?, duration_minutes = ?,
                    is_important = ?, description = ?, due_date = ?, place = ?,
                    is_finished = ?, is_delayed = ?, category = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&task.title)
            .bind(&task.time_range)
            .bind(task.date)
            .bind(task.duration_minutes)
            .bind(task.is_important)
            .bind(&task.description)
            .bind(task.due_date)
            .bind(&task.place)
            .bind(task.is_finished)
            .bind(task.is_delayed)
            .bind(&task.category)
            .bind(task.updated_at)
            .bind(&task.id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("task"));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = bounded(self.timeout, async {
            sqlx::query("DELETE FROM tasks WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("task"));
        }
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn list(
        &self,
        user_id: &str,
        query: &TaskQuery,
        page: Option<Pagination>,
    ) -> Result<(Vec<Task>, u64), StoreError> {
        bounded(self.timeout, async {
            let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tasks");
            push_task_filters(&mut count, user_id, query);
            let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

            let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM tasks", TASK_COLUMNS));
            push_task_filters(&mut select, user_id, query);
            select.push(match query.sort {
                TaskSort::Date => " ORDER BY date ASC",
                TaskSort::TimeRange => " ORDER BY time_range ASC",
            });
            if let Some(page) = page {
                select
                    .push(" LIMIT ")
                    .push_bind(i64::from(page.limit))
                    .push(" OFFSET ")
                    .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
            }

            let rows: Vec<TaskRow> = select.build_query_as().fetch_all(&self.pool).await?;
            Ok::<_, StoreError>((rows.into_iter().map(Task::from).collect(), total.max(0) as u64))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn sum_duration_grouped(
        &self,
        user_id: &str,
        range: DateRange,
        group_by: Period,
        finished_only: bool,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        // SQLite has no portable ISO-week formatter; weeks are grouped by day and rekeyed below.
        let key_expr = match group_by {
            Period::Day | Period::Week => "COALESCE(strftime('%Y-%m-%d', date), '')",
            Period::Month => "COALESCE(strftime('%Y-%m', date), '')",
        };
        let sql = format!(
            "SELECT {key} AS bucket, CAST(SUM(duration_minutes) AS INTEGER) AS minutes \
             FROM tasks WHERE user_id = ? AND date >= ? AND date < ? \
             AND (? = 0 OR is_finished = 1) GROUP BY bucket ORDER BY bucket",
            key = key_expr
        );

        let rows: Vec<(String, i64)> = bounded(self.timeout, async {
            sqlx::query_as(&sql)
                .bind(user_id)
                .bind(range.start)
                .bind(range.end)
                .bind(finished_only)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        if group_by != Period::Week {
            return Ok(rows);
        }

        let mut weeks: BTreeMap<String, i64> = BTreeMap::new();
        for (day, minutes) in rows {
            // unparseable days keep their raw key for the caller to reconcile
            let key = match NaiveDate::parse_from_str(&day, "%Y-%m-%d") {
                Ok(day) => Period::Week.raw_key(day),
                Err(_) => day,
            };
            let slot = weeks.entry(key).or_insert(0);
            *slot = slot.saturating_add(minutes);
        }
        Ok(weeks.into_iter().collect())
    }

    #[instrument(skip(self))]
    async fn focus_totals(
        &self,
        user_id: &str,
        range: Option<DateRange>,
    ) -> Result<FocusTotals, StoreError> {
        let (count, minutes, days): (i64, i64, i64) = bounded(self.timeout, async {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "SELECT COUNT(*), CAST(COALESCE(SUM(duration_minutes), 0) AS INTEGER), \
                 COUNT(DISTINCT strftime('%Y-%m-%d', date)) FROM tasks WHERE is_finished = 1 AND user_id = ",
            );
            qb.push_bind(user_id);
            if let Some(range) = range {
                qb.push(" AND date >= ").push_bind(range.start);
                qb.push(" AND date < ").push_bind(range.end);
            }
            qb.build_query_as()
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        Ok(FocusTotals {
            finished_count: count.max(0) as u64,
            duration_minutes: minutes,
            active_days: days.max(0) as u64,
        })
    }
}
