pub mod image_routes;
pub mod query_routes;
pub mod tag_routes;
pub mod task_routes;
pub mod user_routes;
