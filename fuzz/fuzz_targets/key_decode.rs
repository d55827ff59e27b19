#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;
use tracehouse_core::{KeyCipher, DECODE_CAPACITY};

fn cipher() -> &'static KeyCipher {
    static CIPHER: OnceLock<KeyCipher> = OnceLock::new();
    CIPHER.get_or_init(|| KeyCipher::new("fuzz-secret").unwrap())
}

fuzz_target!(|data: &[u8]| {
    // Opaque keys arrive straight from request URLs. Tests handling of:
    // - Invalid base64 characters and padding
    // - Lengths that are not a whole number of cipher blocks
    // - Oversized tokens
    // - Ciphertext that decrypts to bad padding or invalid UTF-8
    let token = String::from_utf8_lossy(data);
    let cipher = cipher();

    let _ = cipher.decode(&token, DECODE_CAPACITY);
    let _ = cipher.decode(&token, usize::MAX);
    let _ = cipher.decode_principal(&token);
});
