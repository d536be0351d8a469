// Data models and configuration for the Notegate server

pub mod app_state;
pub mod config;
pub mod note;
pub mod response;
