// Library exports so integration tests can drive the application
// modules directly.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod forms;
pub mod i18n;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod uploads;
