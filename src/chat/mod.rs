pub mod auth;
pub mod controllers;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

pub use error::EngineError;
