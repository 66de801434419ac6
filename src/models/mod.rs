// src/models/mod.rs

pub mod certificate;
pub mod certification;
pub mod exam_session;
pub mod question;
