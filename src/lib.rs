pub mod audit;
pub mod config;
pub mod effects;
pub mod engine;
pub mod journal;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reminder;
pub mod validate;
