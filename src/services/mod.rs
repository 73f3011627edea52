pub mod analysis_service;
pub mod auth_service;
