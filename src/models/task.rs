use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;
/// Longest focus session a single task may record.
pub const MAX_TASK_DURATION_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub time_range: String,
    pub date: DateTime<Utc>,
    pub duration_minutes: i64,
    pub is_important: bool,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub place: String,
    pub is_finished: bool,
    pub is_delayed: bool,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub time_range: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub duration_minutes: i64,
    #[serde(default)]
    pub is_important: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub place: String,
    #[serde(default)]
    pub category: String,
}

impl Task {
    pub fn new(user_id: &str, input: TaskInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: input.title,
            time_range: input.time_range,
            date: input.date,
            duration_minutes: input.duration_minutes,
            is_important: input.is_important,
            description: input.description,
            due_date: input.due_date,
            place: input.place,
            is_finished: false,
            is_delayed: false,
            category: input.category,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the user-editable fields, keeping identity and progress flags.
    pub fn apply(self, input: TaskInput, now: DateTime<Utc>) -> Self {
        Self {
            title: input.title,
            time_range: input.time_range,
            date: input.date,
            duration_minutes: input.duration_minutes,
            is_important: input.is_important,
            description: input.description,
            due_date: input.due_date,
            place: input.place,
            category: input.category,
            updated_at: now,
            ..self
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub show_all: bool,
    #[serde(default)]
    pub unfinished: bool,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub sort_by_time: bool,
    #[serde(default, rename = "category")]
    pub category_filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskSort {
    #[default]
    Date,
    TimeRange,
}

/// Store-level selection of a user's tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub range: Option<super::focus::DateRange>,
    pub unfinished_only: bool,
    pub important_only: bool,
    pub category: Option<String>,
    pub search: Option<String>,
    pub sort: TaskSort,
}

impl TaskQuery {
    /// `show_all` disables every narrowing flag; sorting still applies.
    pub fn with_filter(mut self, filter: &TaskFilter) -> Self {
        if filter.sort_by_time {
            self.sort = TaskSort::TimeRange;
        }
        if filter.show_all {
            return self;
        }
        self.unfinished_only = filter.unfinished;
        self.important_only = filter.important;
        if !filter.category_filter.is_empty() {
            self.category = Some(filter.category_filter.clone());
        }
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(range) = &self.range {
            if !range.contains(task.date) {
                return false;
            }
        }
        if self.unfinished_only && task.is_finished {
            return false;
        }
        if self.important_only && !task.is_important {
            return false;
        }
        if let Some(category) = &self.category {
            if &task.category != category {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let hit = [&task.title, &task.description, &task.category, &task.place]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

impl Pagination {
    /// Clamp to page >= 1 and 1 <= limit <= 100, falling back to the default limit.
    pub fn normalized(self) -> Self {
        let page = self.page.max(1);
        let limit = if self.limit < 1 || self.limit > MAX_PAGE_LIMIT {
            DEFAULT_PAGE_LIMIT
        } else {
            self.limit
        };
        Self { page, limit }
    }

    /// Rows to skip; widened so a huge `page` cannot overflow.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
