pub mod database;

pub use database::create_pool;
