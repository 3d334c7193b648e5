//! Time-weighted and linear average sensors over asynchronously updated
//! entity states.

pub mod agent;
pub mod config;
pub mod export;
pub mod sensor;
pub mod server;
pub mod state;
