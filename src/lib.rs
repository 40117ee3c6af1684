pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use context::AppContext;
