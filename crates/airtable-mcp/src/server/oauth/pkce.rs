//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Only the S256 method is supported (RFC 7636). Plain challenges are
//! rejected before a code is ever issued.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The only accepted challenge method.
pub const METHOD_S256: &str = "S256";

/// Compute the S256 challenge for a verifier: `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn challenge_s256(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Verify a PKCE S256 code challenge in constant time.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    let computed = challenge_s256(code_verifier);
    computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_s256_rfc7636_vector() {
        assert_eq!(challenge_s256(VERIFIER), CHALLENGE);
        assert!(verify_s256(VERIFIER, CHALLENGE));
    }

    #[test]
    fn test_s256_invalid_verifier() {
        assert!(!verify_s256("wrong-verifier", CHALLENGE));
    }

    #[test]
    fn test_s256_invalid_challenge() {
        assert!(!verify_s256(VERIFIER, "wrong-challenge"));
        assert!(!verify_s256(VERIFIER, ""));
    }

    #[test]
    fn test_s256_padded_challenge_rejected() {
        assert!(!verify_s256(VERIFIER, &format!("{CHALLENGE}=")));
    }
}
