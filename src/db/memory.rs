use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::{StoreError, TaskStore, UserStore};
use crate::models::{
    focus::{DateRange, FocusTotals, Period},
    task::{Pagination, Task, TaskQuery, TaskSort},
    user::User,
};

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn create(&self, user: User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("username already exists".into()));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound("user")),
        }
    }
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get(&self, id: &str) -> Result<Task, StoreError> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound("task"))
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound("task")),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.tasks
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("task"))
    }

    async fn list(
        &self,
        user_id: &str,
        query: &TaskQuery,
        page: Option<Pagination>,
    ) -> Result<(Vec<Task>, u64), StoreError> {
        let mut matched: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id && query.matches(t))
            .cloned()
            .collect();

        match query.sort {
            TaskSort::Date => matched.sort_by(|a, b| a.date.cmp(&b.date)),
            TaskSort::TimeRange => matched.sort_by(|a, b| a.time_range.cmp(&b.time_range)),
        }

        let total = matched.len() as u64;
        let tasks = match page {
            Some(page) => matched
                .into_iter()
                .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
                .take(page.limit as usize)
                .collect(),
            None => matched,
        };
        Ok((tasks, total))
    }

    async fn sum_duration_grouped(
        &self,
        user_id: &str,
        range: DateRange,
        group_by: Period,
        finished_only: bool,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut sums: BTreeMap<String, i64> = BTreeMap::new();
        for task in self.tasks.read().await.values() {
            if task.user_id != user_id || !range.contains(task.date) {
                continue;
            }
            if finished_only && !task.is_finished {
                continue;
            }
            let key = group_by.raw_key(task.date.date_naive());
            let slot = sums.entry(key).or_insert(0);
            *slot = slot.saturating_add(task.duration_minutes);
        }
        Ok(sums.into_iter().collect())
    }

    async fn focus_totals(
        &self,
        user_id: &str,
        range: Option<DateRange>,
    ) -> Result<FocusTotals, StoreError> {
        let tasks = self.tasks.read().await;
        let finished = tasks.values().filter(|t| {
            t.user_id == user_id
                && t.is_finished
                && range.map_or(true, |r| r.contains(t.date))
        });

        let mut totals = FocusTotals::default();
        let mut days = BTreeSet::new();
        for task in finished {
            totals.finished_count += 1;
            totals.duration_minutes = totals.duration_minutes.saturating_add(task.duration_minutes);
            days.insert(task.date.date_naive());
        }
        totals.active_days = days.len() as u64;
        Ok(totals)
    }
}
