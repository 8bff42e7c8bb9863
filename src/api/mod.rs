pub mod auth;
pub mod focus;
pub mod task;
pub mod user;
