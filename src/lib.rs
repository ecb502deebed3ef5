pub mod api;
pub mod assets;
pub mod config;
pub mod export;
pub mod forms;
pub mod query;
pub mod server;
pub mod warehouse;
