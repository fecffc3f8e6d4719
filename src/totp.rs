// totp.rs
// Member login codes: TOTP built from the member's Base32 secret, and secret generation.

use anyhow::Result;
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use totp_rs::{Algorithm, Secret, TOTP};

pub const MIN_SECRET_BYTES: usize = 16; // 128 bits
pub const DEFAULT_SECRET_BYTES: usize = 20; // 160 bits

/// Issuer shown in authenticator apps when no organization is active.
pub const DEFAULT_ISSUER: &str = "Tesoreria";

/// Builds the TOTP for `email` (SHA1, 6 digits, 30 s, ±1 step).
/// Secrets shorter than `MIN_SECRET_BYTES` after Base32 decoding are rejected.
pub fn build_totp(issuer: &str, email: &str, base32_secret: &str) -> Result<TOTP> {
    let secret = Secret::Encoded(base32_secret.trim().to_uppercase()).to_bytes()?;
    if secret.len() < MIN_SECRET_BYTES {
        anyhow::bail!(
            "shared secret too short: {} bytes, need >= {}",
            secret.len(),
            MIN_SECRET_BYTES
        );
    }
    // totp-rs rejects ':' in issuer and account name for otpauth URLs.
    let issuer = issuer.replace(':', " ");
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret,
        Some(issuer),
        email.replace(':', " "),
    )?;
    Ok(totp)
}

/// Checks a submitted code against the current time window.
pub fn verify_code(email: &str, base32_secret: &str, code: &str) -> Result<bool> {
    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }
    let totp = build_totp(DEFAULT_ISSUER, email, base32_secret)?;
    Ok(totp.check_current(code)?)
}

/// Random Base32 (no padding) secret of at least `MIN_SECRET_BYTES` bytes.
pub fn generate_base32_secret_n(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes.max(MIN_SECRET_BYTES)];
    rand::rng().fill_bytes(&mut buf);
    BASE32_NOPAD.encode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_meet_minimum_length() {
        let secret = generate_base32_secret_n(4);
        let decoded = BASE32_NOPAD.decode(secret.as_bytes()).unwrap();
        assert_eq!(decoded.len(), MIN_SECRET_BYTES);
        assert_ne!(secret, generate_base32_secret_n(4));
    }

    #[test]
    fn short_secret_is_rejected() {
        let short = BASE32_NOPAD.encode(&[1u8; 8]);
        assert!(build_totp(DEFAULT_ISSUER, "a@b.mx", &short).is_err());
    }

    #[test]
    fn current_code_verifies() {
        let secret = generate_base32_secret_n(DEFAULT_SECRET_BYTES);
        let totp = build_totp(DEFAULT_ISSUER, "a@b.mx", &secret).unwrap();
        let code = totp.generate_current().unwrap();
        assert!(verify_code("a@b.mx", &secret, &code).unwrap());
        assert!(!verify_code("a@b.mx", &secret, "12ab56").unwrap());
    }

    #[test]
    fn otpauth_url_names_issuer() {
        let secret = generate_base32_secret_n(DEFAULT_SECRET_BYTES);
        let totp = build_totp("Cooperativa: Centro", "a@b.mx", &secret).unwrap();
        assert!(totp.get_url().starts_with("otpauth://totp/"));
    }
}
