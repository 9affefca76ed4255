pub mod app;
pub use app::run;

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod utils;
pub mod verify;

// Platform abstraction layer
pub mod platform;

pub mod service;
pub mod supervisor;

pub mod integrations {
    pub mod docker;
    pub mod packages;
}

pub use error::{Error, Result};
pub use supervisor::Supervisor;
