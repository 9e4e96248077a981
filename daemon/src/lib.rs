pub mod api;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod db;
pub mod gateway;
pub mod history;
pub mod logging;
