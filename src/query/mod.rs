pub mod builder;
pub mod cost;
pub mod request;
