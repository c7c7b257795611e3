//! Session token signing and verification
//!
//! Wire format: `<base64url(claims JSON)>.<hex HMAC-SHA256 digest>`, with the
//! digest computed over the exact JSON byte sequence. The `.` delimiter
//! appears in neither the unpadded base64url alphabet nor the lowercase hex
//! alphabet, so splitting on the last `.` is unambiguous.
//!
//! Each token kind signs with its own key, derived from the root secret and
//! the kind label. A token issued as one kind never verifies as another.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::models::{TokenClaims, TokenKind};

type HmacSha256 = Hmac<Sha256>;

/// Why a token failed verification.
///
/// The ordering matters to callers: structural problems report `Malformed`
/// before any signature work, and `Expired` is only reported for tokens
/// whose signature already checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Not in `<payload>.<digest>` shape, or the payload fails to decode
    #[error("malformed token")]
    Malformed,
    /// The digest does not match the payload
    #[error("invalid token signature")]
    BadSignature,
    /// Structure and signature are valid but the expiry has passed
    #[error("token expired")]
    Expired,
}

/// HMAC-SHA256 token signer with per-kind derived keys.
pub struct TokenSigner {
    access_key: Vec<u8>,
    refresh_key: Vec<u8>,
    reset_key: Vec<u8>,
}

impl TokenSigner {
    /// Build a signer from the root secret.
    pub fn new(root_secret: &str) -> Self {
        Self {
            access_key: derive_key(root_secret, TokenKind::Access),
            refresh_key: derive_key(root_secret, TokenKind::Refresh),
            reset_key: derive_key(root_secret, TokenKind::Reset),
        }
    }

    fn key_for(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => &self.access_key,
            TokenKind::Refresh => &self.refresh_key,
            TokenKind::Reset => &self.reset_key,
        }
    }

    /// Sign claims into a token string.
    pub fn create(&self, kind: TokenKind, claims: &TokenClaims) -> anyhow::Result<String> {
        let payload = serde_json::to_vec(claims)?;

        let mut mac = HmacSha256::new_from_slice(self.key_for(kind))
            .map_err(|e| anyhow::anyhow!("Invalid signing key length: {}", e))?;
        mac.update(&payload);
        let digest = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            data_encoding::BASE64URL_NOPAD.encode(&payload),
            data_encoding::HEXLOWER.encode(&digest)
        ))
    }

    /// Check structure and signature, ignoring expiry.
    ///
    /// The signature comparison runs in constant time via `Mac::verify_slice`.
    pub fn decode(&self, kind: TokenKind, token: &str) -> Result<TokenClaims, TokenError> {
        let (payload_b64, digest_hex) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;

        let payload = data_encoding::BASE64URL_NOPAD
            .decode(payload_b64.as_bytes())
            .map_err(|_| TokenError::Malformed)?;
        let claims: TokenClaims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        // A corrupted digest is a signature failure, not a parse failure:
        // once the payload decodes, everything after the delimiter is
        // judged purely as a signature.
        let digest = data_encoding::HEXLOWER
            .decode(digest_hex.as_bytes())
            .map_err(|_| TokenError::BadSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.key_for(kind))
            .map_err(|_| TokenError::BadSignature)?;
        mac.update(&payload);
        mac.verify_slice(&digest)
            .map_err(|_| TokenError::BadSignature)?;

        Ok(claims)
    }

    /// Full stateless verification: structure, signature, then expiry.
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.decode(kind, token)?;
        if claims.is_expired() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Decode a token that may be either session kind.
    ///
    /// Access and refresh tokens share the wire format and differ only in
    /// signing key, so a cached token is tried against both session domains.
    /// Reset tokens are deliberately excluded.
    pub fn decode_session(&self, token: &str) -> Result<(TokenKind, TokenClaims), TokenError> {
        match self.decode(TokenKind::Access, token) {
            Ok(claims) => Ok((TokenKind::Access, claims)),
            Err(TokenError::BadSignature) => self
                .decode(TokenKind::Refresh, token)
                .map(|claims| (TokenKind::Refresh, claims)),
            Err(e) => Err(e),
        }
    }
}

/// Derive a kind-scoped signing key from the root secret.
fn derive_key(root_secret: &str, kind: TokenKind) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(root_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(kind.label().as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// SHA-256 hex digest of a full token string.
///
/// This is the revocation-store key; the raw token is never persisted.
pub fn token_hash(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    data_encoding::HEXLOWER.encode(&digest)
}
