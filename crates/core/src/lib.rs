#![deny(missing_docs)]
//! Pinhold pinning agent core.
//!
//! This crate provides the production implementations of the
//! [pinhold_api] module traits: the pin scheduling engine, the storage
//! node http client, and the controller status reporter.

use base64::prelude::*;
use pinhold_api::{builder::Builder, config::Config, *};

/// A default [pinhold_api::signer::Signer] based on ed25519_dalek.
#[derive(Debug)]
pub struct Ed25519Signer {
    key: ed25519_dalek::SigningKey,
}

impl Ed25519Signer {
    /// Construct a signer from a 32 byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }
}

impl signer::Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> PinResult<Vec<u8>> {
        use ed25519_dalek::Signer;

        Ok(self.key.sign(message).to_bytes().to_vec())
    }

    fn public_key(&self) -> String {
        BASE64_STANDARD.encode(self.key.verifying_key().as_bytes())
    }
}

/// A default [pinhold_api::signer::Verifier] based on ed25519_dalek.
#[derive(Debug)]
pub struct Ed25519Verifier;

impl signer::Verifier for Ed25519Verifier {
    fn verify(
        &self,
        public_key: &str,
        message: &[u8],
        signature: &[u8],
    ) -> bool {
        use ed25519_dalek::Verifier;

        let key = match BASE64_STANDARD.decode(public_key) {
            Ok(key) => key,
            Err(_) => return false,
        };

        let key: [u8; 32] = match key.as_slice().try_into() {
            Ok(key) => key,
            Err(_) => return false,
        };

        let key = match ed25519_dalek::VerifyingKey::from_bytes(&key) {
            Ok(key) => key,
            Err(_) => return false,
        };

        let signature: [u8; 64] = match signature.try_into() {
            Ok(signature) => signature,
            Err(_) => return false,
        };

        let signature = ed25519_dalek::Signature::from_bytes(&signature);

        key.verify(message, &signature).is_ok()
    }
}

/// Construct a production-ready default builder.
///
/// - `signer` - The report signer, typically an [Ed25519Signer].
/// - `node` - The default node client is [factories::HttpNodeFactory].
/// - `pinner` - The default pin engine is [factories::CorePinnerFactory].
/// - `report` - The default reporter is [factories::HttpReportFactory].
pub fn default_builder(signer: DynSigner) -> Builder {
    Builder {
        config: Config::default(),
        signer,
        node: factories::HttpNodeFactory::create(),
        pinner: factories::CorePinnerFactory::create(),
        report: factories::HttpReportFactory::create(),
    }
}

pub mod factories;
