//! Authentication plugin scrambles.
//!
//! # mysql_native_password
//!
//! ```text
//! SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))
//! ```
//!
//! # caching_sha2_password
//!
//! Fast auth (password cached on the server):
//! ```text
//! SHA256(password) XOR SHA256(SHA256(SHA256(password)) + scramble)
//! ```
//!
//! Full auth without TLS sends the NUL-terminated password XORed with the
//! scramble and encrypted with the server's RSA public key.

use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use mysqlwire_core::{Error, HandshakeError, HandshakeErrorKind, Result};

/// Well-known authentication plugin names.
pub mod plugins {
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// Bytes of the caching_sha2_password exchange.
pub mod caching_sha2 {
    /// Leading byte of an AuthMoreData packet
    pub const MORE_DATA: u8 = 0x01;
    /// Client asks for the server's RSA public key
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Length of a complete scramble.
pub const SCRAMBLE_LEN: usize = 20;

/// Plugins this client can answer.
pub fn is_supported(plugin: &str) -> bool {
    matches!(
        plugin,
        plugins::MYSQL_NATIVE_PASSWORD
            | plugins::CACHING_SHA2_PASSWORD
            | plugins::MYSQL_CLEAR_PASSWORD
    )
}

/// Compute the first auth response for `plugin`.
#[allow(clippy::result_large_err)]
pub fn auth_response(plugin: &str, password: &str, scramble: &[u8]) -> Result<Vec<u8>> {
    match plugin {
        plugins::MYSQL_NATIVE_PASSWORD => Ok(mysql_native_password(password, scramble)),
        plugins::CACHING_SHA2_PASSWORD => Ok(caching_sha2_password(password, scramble)),
        plugins::MYSQL_CLEAR_PASSWORD => {
            let mut token = password.as_bytes().to_vec();
            token.push(0);
            Ok(token)
        }
        other => Err(Error::Handshake(HandshakeError {
            kind: HandshakeErrorKind::UnsupportedPlugin,
            message: format!("unsupported authentication plugin '{other}'"),
            server: None,
        })),
    }
}

fn seed(scramble: &[u8]) -> &[u8] {
    &scramble[..scramble.len().min(SCRAMBLE_LEN)]
}

/// `mysql_native_password` token. An empty password yields an empty token.
pub fn mysql_native_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(seed(scramble));
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// `caching_sha2_password` fast-auth token. An empty password yields an
/// empty token.
pub fn caching_sha2_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let hash1: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let hash2: [u8; 32] = Sha256::digest(hash1).into();

    let mut hasher = Sha256::new();
    hasher.update(hash2);
    hasher.update(seed(scramble));
    let hash3: [u8; 32] = hasher.finalize().into();

    hash1.iter().zip(hash3.iter()).map(|(a, b)| a ^ b).collect()
}

/// Encrypt the password for full authentication with the server's RSA key
/// (PEM, SPKI or PKCS#1), using OAEP padding.
#[allow(clippy::result_large_err)]
pub fn encrypt_password_rsa(
    password: &str,
    scramble: &[u8],
    public_key_pem: &[u8],
) -> Result<Vec<u8>> {
    let seed = seed(scramble);
    if seed.is_empty() {
        return Err(auth_failure("cannot encrypt password without a scramble"));
    }

    let mut plain = password.as_bytes().to_vec();
    plain.push(0);
    for (i, b) in plain.iter_mut().enumerate() {
        *b ^= seed[i % seed.len()];
    }

    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| auth_failure(format!("server public key is not UTF-8 PEM: {e}")))?;
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| auth_failure(format!("failed to parse server public key: {e}")))?;

    key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &plain)
        .map_err(|e| auth_failure(format!("RSA encryption failed: {e}")))
}

fn auth_failure(message: impl Into<String>) -> Error {
    Error::Handshake(HandshakeError {
        kind: HandshakeErrorKind::AuthFailed,
        message: message.into(),
        server: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRAMBLE: &[u8] = b"ABCDEFGHIJKLMNOP0000";

    #[test]
    fn test_native_password_golden_value() {
        let token = mysql_native_password("secret", SCRAMBLE);
        assert_eq!(
            token,
            [
                0x40, 0x98, 0xf8, 0x46, 0xb5, 0x8a, 0x84, 0xf4, 0x48, 0x6d, 0xb8, 0xff, 0x92,
                0x0f, 0x53, 0xab, 0xae, 0x99, 0x7d, 0xe5
            ]
        );
    }

    #[test]
    fn test_native_password_ignores_trailing_nul() {
        let mut with_nul = SCRAMBLE.to_vec();
        with_nul.push(0);
        assert_eq!(
            mysql_native_password("secret", &with_nul),
            mysql_native_password("secret", SCRAMBLE)
        );
    }

    #[test]
    fn test_empty_password_sends_empty_token() {
        assert!(mysql_native_password("", SCRAMBLE).is_empty());
        assert!(caching_sha2_password("", SCRAMBLE).is_empty());
    }

    #[test]
    fn test_caching_sha2_golden_value() {
        let token = caching_sha2_password("secret", SCRAMBLE);
        assert_eq!(
            token,
            [
                0x87, 0x71, 0xf1, 0x6d, 0x75, 0x57, 0x36, 0x9f, 0xaa, 0xa3, 0xaf, 0x2b, 0xed,
                0x1c, 0xf6, 0xae, 0xe6, 0xad, 0xcd, 0x69, 0x58, 0x0f, 0x05, 0x7b, 0x98, 0x0d,
                0xa0, 0xb5, 0x8e, 0x98, 0x4d, 0x2e
            ]
        );
    }

    #[test]
    fn test_auth_response_dispatch() {
        assert_eq!(
            auth_response(plugins::MYSQL_CLEAR_PASSWORD, "pw", SCRAMBLE).unwrap(),
            b"pw\0".to_vec()
        );
        assert_eq!(
            auth_response(plugins::MYSQL_NATIVE_PASSWORD, "secret", SCRAMBLE)
                .unwrap()
                .len(),
            20
        );
        let err = auth_response("authentication_ldap_sasl_client", "pw", SCRAMBLE).unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError {
                kind: HandshakeErrorKind::UnsupportedPlugin,
                ..
            })
        ));
        assert!(is_supported(plugins::CACHING_SHA2_PASSWORD));
        assert!(!is_supported("sha256_password"));
    }

    #[test]
    fn test_rsa_encryption_round_trip() {
        use rsa::pkcs1::{EncodeRsaPublicKey, LineEnding};
        use rsa::{Oaep, RsaPrivateKey};

        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        // servers may send PKCS#1 instead of SPKI
        let pem = private_key
            .to_public_key()
            .to_pkcs1_pem(LineEnding::LF)
            .unwrap();

        let encrypted = encrypt_password_rsa("pw", SCRAMBLE, pem.as_bytes()).unwrap();
        let plain = private_key.decrypt(Oaep::new::<Sha1>(), &encrypted).unwrap();
        assert_eq!(plain, [b'p' ^ b'A', b'w' ^ b'B', b'C']);
    }

    #[test]
    fn test_rsa_rejects_bad_key() {
        let err = encrypt_password_rsa("pw", SCRAMBLE, b"not a key").unwrap_err();
        assert!(err.is_fatal());
        assert!(encrypt_password_rsa("pw", &[], b"").is_err());
    }
}
