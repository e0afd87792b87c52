pub mod broadcaster;
pub mod config;
pub mod connection;
pub mod draft;
pub mod interaction;
pub mod keyboard;
pub mod message_log;
pub mod metrics;
pub mod registry;
pub mod render;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;
