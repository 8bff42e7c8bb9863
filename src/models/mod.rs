pub mod focus;
pub mod jwt;
pub mod task;
pub mod user;
