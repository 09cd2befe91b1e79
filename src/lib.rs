pub mod config;
pub mod linkbot;
pub mod messages;
pub mod runtime;
