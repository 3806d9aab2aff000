//! Report signing types.

use crate::PinResult;
use std::sync::Arc;

/// Trait for signing outgoing status reports on behalf of this agent.
pub trait Signer: 'static + Send + Sync + std::fmt::Debug {
    /// Sign a message, returning the detached signature bytes.
    fn sign(&self, message: &[u8]) -> PinResult<Vec<u8>>;

    /// The base64 encoded public key identifying this agent.
    fn public_key(&self) -> String;
}

/// Trait object [Signer].
pub type DynSigner = Arc<dyn Signer>;

/// Trait for verifying signed reports. The controller end of the
/// protocol; the agent itself only needs it in tests.
pub trait Verifier: 'static + Send + Sync + std::fmt::Debug {
    /// Verify a signature over a message against a base64 encoded
    /// public key.
    fn verify(
        &self,
        public_key: &str,
        message: &[u8],
        signature: &[u8],
    ) -> bool;
}

/// Trait object [Verifier].
pub type DynVerifier = Arc<dyn Verifier>;
