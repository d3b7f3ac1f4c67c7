//! Field-level encryption of PII and one-way lookup hashes.

mod codec;

pub use codec::{hash, hash_email, CryptoError, FieldCipher, ENCRYPTED_PREFIX};
