// src/lib.rs

pub mod config;
pub mod error;
pub mod exam;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod seed;
pub mod state;
pub mod store;
pub mod utils;

// Re-export specific items for convenience if needed
pub use exam::ExamEngine;
pub use routes::create_router;
