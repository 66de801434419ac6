// src/exam/certificate.rs

use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::{
    error::AppError,
    exam::ExamEngine,
    models::{
        certificate::{Certificate, CertificateVerification, NewCertificate},
        exam_session::{ExamSession, SessionStatus},
    },
    store::StoreError,
};

/// Why a certificate could not be issued.
#[derive(Debug)]
pub enum CertificateError {
    /// The session did not pass.
    NotPassed(i64),

    /// A generated number or hash already exists.
    Collision(String),

    Store(StoreError),
}

impl fmt::Display for CertificateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateError::NotPassed(id) => write!(f, "session {} has not passed", id),
            CertificateError::Collision(msg) => {
                write!(f, "generated certificate identifiers collided: {}", msg)
            }
            CertificateError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CertificateError {}

impl From<StoreError> for CertificateError {
    fn from(err: StoreError) -> Self {
        CertificateError::Store(err)
    }
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// `CERT-<YYYYMMDD>-<unix millis in base36>-<6 random hex digits>`
pub fn certificate_number<R: RngCore + ?Sized>(issued_at: DateTime<Utc>, rng: &mut R) -> String {
    format!(
        "CERT-{}-{}-{:06X}",
        issued_at.format("%Y%m%d"),
        base36(issued_at.timestamp_millis().max(0) as u64),
        rng.next_u32() & 0x00FF_FFFF
    )
}

/// 256 random bits as lowercase hex.
pub fn verification_hash<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl ExamEngine {
    /// Issues the certificate of a passed session.
    ///
    /// The session id is the idempotency key: an existing certificate is
    /// returned as is, and a conflict on the session means a concurrent
    /// issuance already stored one.
    pub async fn issue_certificate(&self, session: &ExamSession) -> Result<Certificate, CertificateError> {
        if session.status != SessionStatus::Passed {
            return Err(CertificateError::NotPassed(session.id));
        }

        if let Some(existing) = self.store.find_certificate_by_session(session.id).await? {
            return Ok(existing);
        }

        let issued_at = Utc::now();
        let (number, hash) = {
            let mut rng = self.entropy.rng();
            (certificate_number(issued_at, &mut rng), verification_hash(&mut rng))
        };

        let new = NewCertificate {
            certificate_number: number,
            user_id: session.user_id,
            certification_id: session.certification_id,
            session_id: session.id,
            verification_hash: hash,
            issued_at,
        };

        match self.store.insert_certificate(new).await {
            Ok(certificate) => {
                tracing::info!(
                    "Issued certificate {} for session {}",
                    certificate.certificate_number,
                    session.id
                );
                Ok(certificate)
            }
            Err(StoreError::Conflict(msg)) => {
                match self.store.find_certificate_by_session(session.id).await? {
                    Some(existing) => Ok(existing),
                    None => Err(CertificateError::Collision(msg)),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Public lookup of a certificate by its verification hash.
    pub async fn verify_certificate(&self, verification_hash: &str) -> Result<CertificateVerification, AppError> {
        let certificate = self
            .store
            .find_certificate_by_hash(verification_hash)
            .await?
            .ok_or_else(|| AppError::NotFound("Certificate not found".to_string()))?;

        Ok(CertificateVerification {
            valid: !certificate.is_revoked,
            certificate,
        })
    }
}
