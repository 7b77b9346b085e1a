use crate::settings::{sha256_hex, Settings};

/// Checks a teacher password against the configured sha-256 digest.
/// With no digest configured the gate never opens.
pub fn verify_password(settings: &Settings, candidate: &str) -> bool {
    let Some(expected) = settings.password_sha256.as_deref() else {
        tracing::warn!("teacher password not configured; unlock refused");
        return false;
    };
    constant_time_eq(sha256_hex(candidate).as_bytes(), expected.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
