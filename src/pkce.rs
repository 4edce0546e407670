//! PKCE S256 challenge generation
//!
//! The OAuth redirect carries a `code_challenge`; the callback handler later
//! proves possession of the matching `code_verifier` when it exchanges the
//! authorization code. The verifier travels between the two requests in a
//! short-lived cookie.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use sha2::{Digest, Sha256};

/// A PKCE S256 verifier and its derived challenge.
///
/// # Examples
///
/// ```
/// use bookmark_manager::pkce::generate;
///
/// let pkce = generate();
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_ne!(pkce.verifier, pkce.challenge);
/// ```
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// 32 random bytes, base64url-encoded without padding (43 characters).
    pub verifier: String,
    /// base64url (no padding) SHA-256 digest of the verifier.
    pub challenge: String,
}

/// Generates a fresh PKCE S256 challenge.
pub fn generate() -> PkceChallenge {
    use rand::RngCore as _;

    let mut random_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut random_bytes);

    let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);

    PkceChallenge {
        challenge: challenge_for(&verifier),
        verifier,
    }
}

/// Computes the S256 challenge for a verifier
/// (`BASE64URL(SHA256(ASCII(code_verifier)))`).
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_verifier_length() {
        assert_eq!(generate().verifier.len(), 43);
    }

    #[test]
    fn test_generate_verifier_is_url_safe() {
        let pkce = generate();
        assert!(pkce
            .verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generate_produces_unique_verifiers() {
        assert_ne!(generate().verifier, generate().verifier);
    }

    #[test]
    fn test_challenge_matches_verifier() {
        let pkce = generate();
        assert_eq!(challenge_for(&pkce.verifier), pkce.challenge);
    }

    #[test]
    fn test_challenge_for_rfc_vector() {
        // RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            challenge_for(verifier),
            "E9Melhoa2OwvFrYMTJguCHZ-FEYtpxTmKt3jcTKRp6M"
        );
    }
}
