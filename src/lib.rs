pub mod ai;
pub mod db;
pub mod ingest;
pub mod media;
pub mod server;
pub mod services;
pub mod tasks;
pub mod web;
