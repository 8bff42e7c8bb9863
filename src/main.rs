use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod errors;
mod middleware;
mod models;
mod services;
mod utils;
#[cfg(test)]
mod tests;

use config::Config;
use db::{Stores, TaskStore, UserStore};
use middleware::{auth::auth_middleware, token_refresh::token_refresh_middleware};
use services::{auth_service::AuthService, focus_service::FocusService, jwt_service::JwtService};

/// Everything a handler or middleware needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: Arc<JwtService>,
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub auth: AuthService,
    pub focus: FocusService,
}

impl AppState {
    pub fn new(config: Config, stores: Stores) -> anyhow::Result<Self> {
        let jwt = Arc::new(JwtService::from_config(&config).context("invalid token keys")?);
        let auth = AuthService::new(stores.users.clone(), jwt.clone(), config.bcrypt_cost);
        let focus = FocusService::new(stores.tasks.clone());

        Ok(Self {
            config: Arc::new(config),
            jwt,
            users: stores.users,
            tasks: stores.tasks,
            auth,
            focus,
        })
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "store": state.config.store_backend.as_str() }))
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let public = Router::new()
        .route("/health", get(health))
        .route("/api/register", post(api::auth::register))
        .route("/api/login", post(api::auth::login))
        .route("/api/token/refresh", post(api::auth::refresh));

    // route_layer: the last layer added runs first, so the gate wraps the refresher
    let protected = Router::new()
        .route("/api/auth/check", get(api::auth::check))
        .route(
            "/api/users/me",
            get(api::user::get_current_user).put(api::user::update_current_user),
        )
        .route("/api/users/me/logout", post(api::user::logout))
        .route(
            "/api/users/me/status",
            get(api::user::get_status).put(api::user::update_status),
        )
        .route(
            "/api/users/me/permissions",
            get(api::user::get_permissions).put(api::user::update_permissions),
        )
        .route(
            "/api/tasks",
            get(api::task::list_tasks).post(api::task::create_task),
        )
        .route("/api/tasks/today", get(api::task::today_tasks))
        .route("/api/tasks/filter", post(api::task::filter_tasks))
        .route("/api/tasks/today/filter", post(api::task::filter_today_tasks))
        .route("/api/tasks/search", post(api::task::search_tasks))
        .route(
            "/api/tasks/:task_id",
            get(api::task::get_task)
                .put(api::task::update_task)
                .delete(api::task::delete_task),
        )
        .route("/api/tasks/:task_id/toggle", patch(api::task::toggle_task))
        .route("/api/focus/today", get(api::focus::today))
        .route("/api/focus/total", get(api::focus::total))
        .route("/api/focus/distribution", get(api::focus::distribution))
        .route_layer(from_fn_with_state(state.clone(), token_refresh_middleware))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = Config::from_env()?;
    let stores = db::create_stores(&config).await?;
    let addr = config.bind_addr;
    let app = create_router(AppState::new(config, stores)?);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
