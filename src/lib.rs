pub mod analytics;
pub mod auth;
pub mod booking;
pub mod config;
pub mod limits;
pub mod model;
pub mod observability;
pub mod pg;
pub mod resolver;
pub mod resources;
pub mod sql;
pub mod store;
pub mod tls;
pub mod wire;
