//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs, signed tokens and JWK documents.
//! All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Ed25519 signing key published under `kid`.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::new(1, "key-1");
/// let token = keypair.sign(&TestTokenBuilder::new().build());
/// let jwks = serde_json::json!({"keys": [keypair.jwk_json()]});
/// ```
#[derive(Debug, Clone)]
pub struct TestKeypair {
    kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Deterministic keypair; the same seed always produces the same key.
    pub fn new(seed: u8, kid: &str) -> Self {
        Self::try_new(seed, kid).expect("Failed to create test keypair")
    }

    /// Fallible form of [`TestKeypair::new`].
    pub fn try_new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e)))?;

        Ok(Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Sign `claims` as an EdDSA JWT with this key's `kid`.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        self.sign_with_kid(claims, &self.kid)
    }

    /// Sign with this key but announce a different `kid`.
    pub fn sign_with_kid(&self, claims: &serde_json::Value, kid: &str) -> String {
        self.sign_with_header_kid(claims, Some(kid))
    }

    /// Sign with this key and no `kid` in the header.
    pub fn sign_without_kid(&self, claims: &serde_json::Value) -> String {
        self.sign_with_header_kid(claims, None)
    }

    fn sign_with_header_kid(&self, claims: &serde_json::Value, kid: Option<&str>) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = kid.map(str::to_string);

        encode(&header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public key as a JWK.
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    /// Public key as a JWK without `kid`.
    pub fn anonymous_jwk_json(&self) -> serde_json::Value {
        let mut jwk = self.jwk_json();
        if let Some(members) = jwk.as_object_mut() {
            members.remove("kid");
        }
        jwk
    }
}

/// JWKS document holding every key in `keypairs`.
pub fn jwks_json(keypairs: &[&TestKeypair]) -> serde_json::Value {
    serde_json::json!({
        "keys": keypairs.iter().map(|k| k.jwk_json()).collect::<Vec<_>>()
    })
}

/// Token with an arbitrary header and a garbage signature.
///
/// Used for `alg: none`, HMAC and other headers a real key would never
/// produce.
pub fn token_with_header(header: &serde_json::Value, claims: &serde_json::Value) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode(b"not-a-signature")
    )
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE { version INTEGER 0, AlgorithmIdentifier, OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = Vec::with_capacity(48);

    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // OID 1.3.101.112 (Ed25519)
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_is_deterministic() {
        let a = TestKeypair::new(1, "k");
        let b = TestKeypair::new(1, "k");

        assert_eq!(a.jwk_json(), b.jwk_json());
        assert_ne!(a.jwk_json()["x"], TestKeypair::new(2, "k").jwk_json()["x"]);
    }

    #[test]
    fn test_signed_token_carries_kid() {
        let keypair = TestKeypair::new(3, "key-3");
        let token = keypair.sign(&serde_json::json!({"sub": "alice", "exp": 0}));

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("key-3"));
        assert_eq!(header.alg, Algorithm::EdDSA);
    }

    #[test]
    fn test_kidless_fixtures() {
        let keypair = TestKeypair::new(4, "key-4");
        let token = keypair.sign_without_kid(&serde_json::json!({"sub": "svc", "exp": 0}));

        assert!(jsonwebtoken::decode_header(&token).unwrap().kid.is_none());
        assert!(keypair.anonymous_jwk_json().get("kid").is_none());
        assert_eq!(keypair.anonymous_jwk_json()["x"], keypair.jwk_json()["x"]);
    }

    #[test]
    fn test_jwks_json_lists_all_keys() {
        let a = TestKeypair::new(1, "a");
        let b = TestKeypair::new(2, "b");

        let jwks = jwks_json(&[&a, &b]);
        assert_eq!(jwks["keys"].as_array().unwrap().len(), 2);
        assert_eq!(jwks["keys"][1]["kid"], "b");
    }
}
