pub mod app;
pub mod operations;
