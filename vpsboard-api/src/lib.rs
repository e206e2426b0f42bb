pub mod api_docs;
pub mod app;
pub mod auth;
pub mod auth_endpoints;
pub mod bootstrap_admin;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod setup;
pub mod store_pg;
pub mod users_endpoint;

pub use app::AppState;
