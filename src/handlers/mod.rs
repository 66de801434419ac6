// src/handlers/mod.rs

pub mod admin;
pub mod certificate;
pub mod exam;
