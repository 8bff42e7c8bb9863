use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    AppState,
    errors::AppError,
    middleware::auth::CurrentUser,
    models::{
        focus::{DateRange, parse_anchor_date},
        task::{
            MAX_TASK_DURATION_MINUTES, Pagination, Task, TaskFilter, TaskInput, TaskPage,
            TaskQuery,
        },
    },
};

#[derive(Deserialize)]
pub struct DayQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
pub struct TodayFilterRequest {
    date: Option<String>,
    #[serde(flatten)]
    filter: TaskFilter,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(alias = "keyword")]
    query: String,
}

/// The requested calendar day, or today (UTC) when none is given.
pub(crate) fn day_or_today(raw: Option<&str>) -> Result<NaiveDate, AppError> {
    match raw.filter(|s| !s.trim().is_empty()) {
        Some(raw) => parse_anchor_date(raw).ok_or_else(|| AppError::InvalidDate(raw.to_string())),
        None => Ok(Utc::now().date_naive()),
    }
}

fn validate(input: &TaskInput) -> Result<(), AppError> {
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("title is required".into()));
    }
    if !(0..=MAX_TASK_DURATION_MINUTES).contains(&input.duration_minutes) {
        return Err(AppError::BadRequest(format!(
            "duration must be between 0 and {} minutes",
            MAX_TASK_DURATION_MINUTES
        )));
    }
    Ok(())
}

/// Load a task, hiding tasks that belong to someone else.
async fn owned_task(state: &AppState, user_id: &str, task_id: &str) -> Result<Task, AppError> {
    let task = state.tasks.get(task_id).await?;
    if task.user_id != user_id {
        return Err(AppError::NotFound("task not found".into()));
    }
    Ok(task)
}

/// One clamped page of `user_id`'s tasks matching `query`.
async fn paged(
    state: &AppState,
    user_id: &str,
    query: &TaskQuery,
    page: Pagination,
) -> Result<Json<TaskPage>, AppError> {
    let page = page.normalized();
    let (tasks, total) = state.tasks.list(user_id, query, Some(page)).await?;
    Ok(Json(TaskPage {
        tasks,
        total,
        page: page.page,
        limit: page.limit,
    }))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(input): Json<TaskInput>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    validate(&input)?;
    let task = state
        .tasks
        .create(Task::new(&current_user.user_id, input, Utc::now()))
        .await?;
    info!(task_id = %task.id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(owned_task(&state, &current_user.user_id, &task_id).await?))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
    Json(input): Json<TaskInput>,
) -> Result<Json<Task>, AppError> {
    validate(&input)?;
    let task = owned_task(&state, &current_user.user_id, &task_id)
        .await?
        .apply(input, Utc::now());
    state.tasks.update(&task).await?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let task = owned_task(&state, &current_user.user_id, &task_id).await?;
    state.tasks.delete(&task.id).await?;
    info!(task_id = %task.id, "Task deleted");
    Ok(Json(json!({ "message": "task deleted" })))
}

pub async fn toggle_task(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let mut task = owned_task(&state, &current_user.user_id, &task_id).await?;
    task.is_finished = !task.is_finished;
    task.updated_at = Utc::now();
    state.tasks.update(&task).await?;
    Ok(Json(task))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
) -> Result<Json<TaskPage>, AppError> {
    paged(&state, &current_user.user_id, &TaskQuery::default(), page).await
}

pub async fn today_tasks(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let day = day_or_today(query.date.as_deref())?;
    let query = TaskQuery {
        range: Some(DateRange::single_day(day)),
        ..Default::default()
    };
    let (tasks, _) = state.tasks.list(&current_user.user_id, &query, None).await?;
    Ok(Json(tasks))
}

pub async fn filter_tasks(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
    Json(filter): Json<TaskFilter>,
) -> Result<Json<TaskPage>, AppError> {
    let query = TaskQuery::default().with_filter(&filter);
    paged(&state, &current_user.user_id, &query, page).await
}

pub async fn filter_today_tasks(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(request): Json<TodayFilterRequest>,
) -> Result<Json<Vec<Task>>, AppError> {
    let day = day_or_today(request.date.as_deref())?;
    let query = TaskQuery {
        range: Some(DateRange::single_day(day)),
        ..Default::default()
    }
    .with_filter(&request.filter);
    let (tasks, _) = state.tasks.list(&current_user.user_id, &query, None).await?;
    Ok(Json(tasks))
}

pub async fn search_tasks(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<TaskPage>, AppError> {
    let needle = request.query.trim();
    if needle.is_empty() {
        return Err(AppError::BadRequest("search query must not be empty".into()));
    }
    let query = TaskQuery {
        search: Some(needle.to_string()),
        ..Default::default()
    };
    paged(&state, &current_user.user_id, &query, page).await
}
