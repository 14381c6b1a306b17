//! Library exports for sabhadesk, shared between the binary and tests.

pub mod client;
pub mod config;
pub mod guard;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod session;
pub mod startup;
pub mod state;
pub mod store;
pub mod utils;
