use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    AppState,
    api::task::day_or_today,
    errors::AppError,
    middleware::auth::CurrentUser,
    models::focus::{Distribution, FocusStats, Period, TotalFocusStats},
};

#[derive(Deserialize)]
pub struct DayQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
pub struct DistributionQuery {
    #[serde(alias = "type")]
    period: Option<String>,
    #[serde(alias = "startDate")]
    start_date: Option<String>,
}

pub async fn today(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<DayQuery>,
) -> Result<Json<FocusStats>, AppError> {
    let day = day_or_today(query.date.as_deref())?;
    Ok(Json(state.focus.today(&current_user.user_id, day).await?))
}

pub async fn total(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<TotalFocusStats>, AppError> {
    Ok(Json(state.focus.total(&current_user.user_id).await?))
}

pub async fn distribution(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<DistributionQuery>,
) -> Result<Json<Distribution>, AppError> {
    let period = query
        .period
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| Period::Day.as_str().to_string());
    let anchor = day_or_today(query.start_date.as_deref())?;

    let distribution = state
        .focus
        .distribution(&current_user.user_id, &period, anchor)
        .await?;
    Ok(Json(distribution))
}
