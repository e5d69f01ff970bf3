pub mod engine;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod schema;
pub mod store;
