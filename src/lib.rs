// ABOUTME: Root library for the switchyard CLI
// ABOUTME: Exposes config loading, paths, logging, app wiring, and the terminal front end

pub mod app;
pub mod config;
pub mod logging;
pub mod paths;
pub mod terminal;

pub use app::{App, Storage};
pub use config::AppConfig;
