//! Cryptographic primitives used by the credential store.

pub mod encryption;

pub use encryption::{CryptoError, FieldCipher, KdfParams};
