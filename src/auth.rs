//! Shared-secret authentication for the queue server.
//!
//! Every request carries the secret in binary metadata. The client side
//! injects it with [`SecretInjector`]; the server side rejects mismatches
//! with `UNAUTHENTICATED` in [`SecretVerifier`] before any handler runs.
//!
//! The secret travels in clear text (and is written into generated worker
//! scripts). This assumes a trusted private cluster network.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Metadata key carrying the shared secret. Must end in `-bin`.
pub const SECRET_METADATA_KEY: &str = "calcit-secret-bin";

/// Pre-agreed credential required to talk to the queue server.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Arc<[u8]>);

impl SharedSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(secret.into()))
    }

    /// Generate a secret of the form `calcit-NNNNN`.
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(10000..30000);
        Self::new(format!("calcit-{}", n))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Secret as text for embedding in generated scripts.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Compare without short-circuiting on the first differing byte.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        if self.0.len() != candidate.len() {
            return false;
        }
        self.0
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

impl FromStr for SharedSecret {
    type Err = std::convert::Infallible;

    /// `auto` generates a fresh secret; anything else is used verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            Ok(Self::generate())
        } else {
            Ok(Self::new(s))
        }
    }
}

/// Client interceptor attaching the secret to every outgoing request.
#[derive(Clone, Debug)]
pub struct SecretInjector {
    secret: SharedSecret,
}

impl SecretInjector {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }
}

impl Interceptor for SecretInjector {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request.metadata_mut().insert_bin(
            SECRET_METADATA_KEY,
            MetadataValue::from_bytes(self.secret.as_bytes()),
        );
        Ok(request)
    }
}

/// Server interceptor rejecting requests whose secret does not match.
#[derive(Clone, Debug)]
pub struct SecretVerifier {
    secret: SharedSecret,
}

impl SecretVerifier {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }
}

impl Interceptor for SecretVerifier {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        let authorized = request
            .metadata()
            .get_bin(SECRET_METADATA_KEY)
            .and_then(|value| value.to_bytes().ok())
            .map(|presented| self.secret.matches(&presented))
            .unwrap_or(false);

        if authorized {
            Ok(request)
        } else {
            tracing::warn!(remote = ?request.remote_addr(), "Rejected request with invalid shared secret");
            Err(Status::unauthenticated("invalid shared secret"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_has_expected_shape() {
        let secret = SharedSecret::generate().to_string_lossy();
        let digits = secret.strip_prefix("calcit-").unwrap();
        let n: u32 = digits.parse().unwrap();
        assert!((10000..30000).contains(&n));
    }

    #[test]
    fn auto_generates_and_other_values_are_verbatim() {
        let auto: SharedSecret = "auto".parse().unwrap();
        assert!(auto.to_string_lossy().starts_with("calcit-"));

        let fixed: SharedSecret = "s3cret".parse().unwrap();
        assert_eq!(fixed.as_bytes(), b"s3cret");
    }

    #[test]
    fn matches_requires_exact_bytes() {
        let secret = SharedSecret::new("abc");
        assert!(secret.matches(b"abc"));
        assert!(!secret.matches(b"abd"));
        assert!(!secret.matches(b"ab"));
        assert!(!secret.matches(b""));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let secret = SharedSecret::new("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn verifier_accepts_injected_secret() {
        let secret = SharedSecret::new("k");
        let request = SecretInjector::new(secret.clone())
            .call(Request::new(()))
            .unwrap();
        assert!(SecretVerifier::new(secret).call(request).is_ok());
    }

    #[test]
    fn verifier_rejects_wrong_or_missing_secret() {
        let request = SecretInjector::new(SharedSecret::new("wrong"))
            .call(Request::new(()))
            .unwrap();
        let mut verifier = SecretVerifier::new(SharedSecret::new("right"));

        let status = verifier.call(request).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);

        let status = verifier.call(Request::new(())).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }
}
