pub mod auth;
pub mod cli;
pub mod clock;
pub mod configuration;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod startup;
pub mod storage;
pub mod telemetry;
pub mod validators;
