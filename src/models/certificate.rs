// src/models/certificate.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'certificates' table in the database.
/// At most one row exists per passed session.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub certificate_number: String,
    pub user_id: i64,
    pub certification_id: i64,
    pub session_id: i64,
    pub verification_hash: String,
    pub issued_at: DateTime<Utc>,
    pub is_revoked: bool,
}

#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub certificate_number: String,
    pub user_id: i64,
    pub certification_id: i64,
    pub session_id: i64,
    pub verification_hash: String,
    pub issued_at: DateTime<Utc>,
}

/// Public answer to "is this certificate genuine?".
#[derive(Debug, Serialize, Deserialize)]
pub struct CertificateVerification {
    pub certificate: Certificate,
    pub valid: bool,
}
