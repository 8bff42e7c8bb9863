pub mod auth_service;
pub mod focus_service;
pub mod jwt_service;
