//! HMAC-SHA256 review signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a message with a session key. Returns hex HMAC-SHA256.
#[must_use]
pub fn hmac_sign(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex HMAC-SHA256 signature in constant time.
///
/// Malformed hex fails verification rather than erroring — a forged
/// signature and a corrupt one are the same to the caller.
#[must_use]
pub fn hmac_verify(key: &[u8], message: &[u8], signature: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(message);
    // Mac::verify_slice is the constant-time comparison.
    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let sig = hmac_sign(b"key", b"message");
        assert!(hmac_verify(b"key", b"message", &sig));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sig = hmac_sign(b"key", b"message");
        assert!(!hmac_verify(b"other", b"message", &sig));
    }

    #[test]
    fn test_wrong_message_fails() {
        let sig = hmac_sign(b"key", b"message");
        assert!(!hmac_verify(b"key", b"massage", &sig));
    }

    #[test]
    fn test_single_bit_flip_fails() {
        let sig = hmac_sign(b"key", b"message");
        // Flip one bit in each hex nibble position and make sure none verify.
        for i in 0..sig.len() {
            let mut bytes = sig.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(bytes).unwrap();
            if tampered != sig {
                assert!(!hmac_verify(b"key", b"message", &tampered), "flip at {i}");
            }
        }
    }

    #[test]
    fn test_malformed_hex_fails_quietly() {
        assert!(!hmac_verify(b"key", b"message", "not-hex!"));
        assert!(!hmac_verify(b"key", b"message", ""));
    }
}
