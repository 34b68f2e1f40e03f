pub mod api;
pub mod backup;
pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod settings;
pub mod status;
