pub mod app;
pub mod chat_stream;
pub mod config;
pub mod message;
pub mod persist;
pub mod store;
pub mod thread;
