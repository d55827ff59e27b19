//! Opaque Principal Keys
//!
//! External callers never see a principal's internal id. Instead they are handed
//! an opaque key (a URL-safe token) that the server can turn back into the id.
//!
//! ## Scheme
//!
//! ```text
//! secret ──PBKDF2-HMAC-SHA256 (100 iterations, empty salt)──► 16-byte AES key
//!
//! id ──UTF-8──► AES-128-CBC (fixed IV, PKCS#7) ──► base64url, no padding ──► token
//! ```
//!
//! ## Security Properties
//!
//! This is obfuscation, not encryption in the semantic-security sense:
//!
//! - The IV is fixed, so the same id always produces the same token
//! - There is no MAC, so tokens are not tamper-evident
//! - There is no randomization or expiry
//!
//! The threat model is "a URL must not be guessable from a principal id", nothing
//! more. Anyone holding a token can use it forever, and anyone who learns the
//! secret can mint tokens for any principal.
//!
//! ## Decoding Untrusted Input
//!
//! `decode` runs on attacker-controlled strings. It checks the decoded length
//! against an explicit bound before touching the fixed-size stack buffer, and
//! every failure (bad base64, wrong length, bad padding, invalid UTF-8) comes back
//! as `None`. It never panics and never returns an error.

use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::error::{CoreError, Result};
use crate::principal::PrincipalId;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// PBKDF2 iteration count. Low on purpose: keys are derived on every start and
/// the scheme only guards against guessing.
pub const KEY_DERIVATION_ITERATIONS: u32 = 100;

/// PBKDF2 salt (empty).
pub const KEY_DERIVATION_SALT: &[u8] = &[];

/// Largest `max_bytes` honored by `decode`; the stack buffer size.
pub const DECODE_CAPACITY: usize = 256;

/// Decode bound used when resolving principal keys.
pub const PRINCIPAL_KEY_MAX_BYTES: usize = 64;

const KEY_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

const IV: [u8; BLOCK_LEN] = [
    0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0xba, 0xbe, 0xba, 0xad, 0xf0, 0x0d, 0x4b, 0x1d, 0x51, 0x66,
];

// Longest unpadded base64 text that can decode to DECODE_CAPACITY bytes.
const MAX_TOKEN_CHARS: usize = (DECODE_CAPACITY * 4).div_ceil(3);

/// Derived key material for encoding and decoding opaque tokens.
#[derive(Clone)]
pub struct KeyCipher {
    key: [u8; KEY_LEN],
}

impl fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCipher").field("key", &"<redacted>").finish()
    }
}

impl KeyCipher {
    /// Derive the symmetric key from a secret.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(CoreError::InvalidSecret("secret must not be empty".to_string()));
        }

        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(
            secret.as_bytes(),
            KEY_DERIVATION_SALT,
            KEY_DERIVATION_ITERATIONS,
            &mut key,
        );
        tracing::debug!(
            iterations = KEY_DERIVATION_ITERATIONS,
            "Derived principal key cipher"
        );
        Ok(Self { key })
    }

    /// Encrypt `plaintext` into a URL-safe token. Blank input yields an empty token.
    pub fn encode(&self, plaintext: &str) -> String {
        if plaintext.trim().is_empty() {
            return String::new();
        }

        let bytes = plaintext.as_bytes();
        // PKCS#7 always adds between 1 and BLOCK_LEN bytes
        let mut buf = vec![0u8; bytes.len() + BLOCK_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);

        Aes128CbcEnc::new(&self.key.into(), &IV.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, bytes.len())
            .map(|ciphertext| URL_SAFE_NO_PAD.encode(ciphertext))
            .unwrap_or_default()
    }

    /// Decode a token produced by `encode`.
    ///
    /// Tokens whose ciphertext would exceed `max_bytes` (clamped to
    /// `DECODE_CAPACITY`) are rejected up front. Padded tokens and the standard
    /// base64 alphabet are accepted as well.
    pub fn decode(&self, token: &str, max_bytes: usize) -> Option<String> {
        let token = token.trim().trim_end_matches('=');
        if token.is_empty() || token.len() > MAX_TOKEN_CHARS {
            return None;
        }

        let decoded_len = match token.len() % 4 {
            0 => token.len() / 4 * 3,
            2 => token.len() / 4 * 3 + 1,
            3 => token.len() / 4 * 3 + 2,
            _ => return None,
        };
        let max_bytes = max_bytes.min(DECODE_CAPACITY);
        if decoded_len > max_bytes || decoded_len % BLOCK_LEN != 0 {
            return None;
        }

        let mut text = [0u8; MAX_TOKEN_CHARS];
        for (slot, b) in text.iter_mut().zip(token.bytes()) {
            *slot = match b {
                b'+' => b'-',
                b'/' => b'_',
                other => other,
            };
        }

        // slack for the decoder's rounded-up output estimate
        let mut buf = [0u8; DECODE_CAPACITY + 3];
        let written = URL_SAFE_NO_PAD
            .decode_slice(&text[..token.len()], &mut buf)
            .ok()?;
        if written != decoded_len {
            return None;
        }

        let plaintext = Aes128CbcDec::new(&self.key.into(), &IV.into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf[..written])
            .ok()?;
        std::str::from_utf8(plaintext).ok().map(str::to_owned)
    }

    /// Token for a principal.
    pub fn encode_principal(&self, principal: &PrincipalId) -> String {
        self.encode(&principal.to_string())
    }

    /// Resolve a token to a principal; `None` for anything that is not a valid,
    /// non-nil principal id.
    pub fn decode_principal(&self, token: &str) -> Option<PrincipalId> {
        self.decode(token, PRINCIPAL_KEY_MAX_BYTES)?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> KeyCipher {
        KeyCipher::new("correct horse battery staple").unwrap()
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(KeyCipher::new("").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let cipher = cipher();
        for text in ["a", "hello world", "0123456789abcdef", "ünïcødé ✓"] {
            let token = cipher.encode(text);
            assert_eq!(cipher.decode(&token, DECODE_CAPACITY).as_deref(), Some(text));
        }
    }

    #[test]
    fn test_blank_input_gives_empty_token() {
        let cipher = cipher();
        assert_eq!(cipher.encode(""), "");
        assert_eq!(cipher.encode("   "), "");
        assert_eq!(cipher.decode("", 64), None);
    }

    #[test]
    fn test_tokens_are_url_safe_and_deterministic() {
        let cipher = cipher();
        for _ in 0..50 {
            let principal = PrincipalId::random();
            let token = cipher.encode_principal(&principal);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            assert_eq!(token, cipher.encode_principal(&principal));
            assert_eq!(cipher.decode_principal(&token), Some(principal));
        }
    }

    #[test]
    fn test_padded_and_standard_alphabet_accepted() {
        let cipher = cipher();
        let principal = PrincipalId::random();
        let token = cipher.encode_principal(&principal);

        let standard = token.replace('-', "+").replace('_', "/");
        assert_eq!(cipher.decode_principal(&standard), Some(principal));

        let mut padded = token.clone();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        assert_eq!(cipher.decode_principal(&padded), Some(principal));
    }

    #[test]
    fn test_max_bytes_enforced() {
        let cipher = cipher();
        let token = cipher.encode(&"x".repeat(40)); // 48 byte ciphertext
        assert!(cipher.decode(&token, 48).is_some());
        assert!(cipher.decode(&token, 47).is_none());
        assert!(cipher.decode(&token, 32).is_none());
    }

    #[test]
    fn test_other_secret_cannot_decode() {
        let principal = PrincipalId::random();
        let token = cipher().encode_principal(&principal);
        let other = KeyCipher::new("another secret").unwrap();
        assert_ne!(other.decode_principal(&token), Some(principal));
    }

    #[test]
    fn test_garbage_never_panics() {
        let cipher = cipher();
        let inputs = [
            "!",
            "====",
            "a",
            "ab",
            "abc=",
            "@@@@@@@@@@@@@@@@@@@@@@",
            "AAAAAAAAAAAAAAAAAAAAAA",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "ünïcødé",
            "\0\0\0\0",
        ];
        for input in inputs {
            assert_eq!(cipher.decode_principal(input), None, "input {input:?}");
        }

        let huge = "A".repeat(10_000);
        assert_eq!(cipher.decode(&huge, usize::MAX), None);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let cipher = cipher();
        let principal = PrincipalId::random();
        let token = cipher.encode_principal(&principal);

        let mut bytes = token.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_ne!(cipher.decode_principal(&tampered), Some(principal));
    }
}
