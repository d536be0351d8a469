// Admission and consistency services

pub mod broadcast;
pub mod cache;
pub mod lock;
pub mod quota;
pub mod rate_limit;
