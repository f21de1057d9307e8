//! PKCE (Proof Key for Code Exchange)
//!
//! RFC 7636: binds an authorization code to a client-generated verifier so
//! an intercepted code cannot be exchanged by anyone else.
//!
//! Verification for `S256`: BASE64URL(SHA256(ASCII(code_verifier))) ==
//! code_challenge. For `plain` the verifier is compared directly.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// PKCE code challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// SHA-256 of the verifier, base64url-encoded without padding.
    S256,
    /// Direct equality. Kept for legacy clients; S256 is the default.
    Plain,
}

impl CodeChallengeMethod {
    /// Verify a code_verifier against a stored code_challenge.
    pub fn verify(self, code_verifier: &str, code_challenge: &str) -> bool {
        match self {
            CodeChallengeMethod::S256 => verify_s256(code_verifier, code_challenge),
            CodeChallengeMethod::Plain => code_verifier == code_challenge,
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(CodeChallengeMethod::S256),
            "plain" => Ok(CodeChallengeMethod::Plain),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeChallengeMethod::S256 => f.write_str("S256"),
            CodeChallengeMethod::Plain => f.write_str("plain"),
        }
    }
}

fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    let computed = URL_SAFE_NO_PAD.encode(hasher.finalize());
    computed == code_challenge
}

/// Validate code_verifier format per RFC 7636 Section 4.1:
/// 43-128 characters of [A-Za-z0-9] / "-" / "." / "_" / "~".
pub fn validate_code_verifier(code_verifier: &str) -> bool {
    let len = code_verifier.len();
    if !(43..=128).contains(&len) {
        return false;
    }

    code_verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Validate code_challenge format per RFC 7636 Section 4.2:
/// 43-128 characters of [A-Za-z0-9] / "-" / "_".
pub fn validate_code_challenge(code_challenge: &str) -> bool {
    let len = code_challenge.len();
    if !(43..=128).contains(&len) {
        return false;
    }

    code_challenge
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s256_verification_success() {
        // Test vector from RFC 7636 Appendix B
        let code_verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let code_challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

        assert!(CodeChallengeMethod::S256.verify(code_verifier, code_challenge));
    }

    #[test]
    fn s256_verification_failure() {
        let code_verifier = "wrong_verifier_123456789012345678901234567890";
        let code_challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

        assert!(!CodeChallengeMethod::S256.verify(code_verifier, code_challenge));
    }

    #[test]
    fn plain_verification_is_direct_equality() {
        assert!(CodeChallengeMethod::Plain.verify("same-value", "same-value"));
        assert!(!CodeChallengeMethod::Plain.verify("same-value", "other-value"));
    }

    #[test]
    fn method_parsing() {
        assert_eq!("S256".parse(), Ok(CodeChallengeMethod::S256));
        assert_eq!("plain".parse(), Ok(CodeChallengeMethod::Plain));
        assert!("s256".parse::<CodeChallengeMethod>().is_err());
        assert!("".parse::<CodeChallengeMethod>().is_err());
    }

    #[test]
    fn code_verifier_validation() {
        assert!(validate_code_verifier(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"
        ));

        // Too short (42 chars)
        assert!(!validate_code_verifier(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOE"
        ));

        // Too long (129 chars)
        assert!(!validate_code_verifier(&"a".repeat(129)));

        // Invalid character '='
        assert!(!validate_code_verifier(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk="
        ));
    }

    #[test]
    fn code_challenge_validation() {
        assert!(validate_code_challenge(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        ));

        assert!(!validate_code_challenge("E9Melhoa2OwvFrEMTJguCHaoeK1t8URW"));

        // '.' is not allowed in challenges
        assert!(!validate_code_challenge(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw.cM"
        ));
    }
}
