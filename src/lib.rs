pub mod alerts;
pub mod config;
pub mod db;
pub mod errors;
pub mod geo;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod sources;
pub mod store;
