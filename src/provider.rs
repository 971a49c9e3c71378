//! Capability interface to a homomorphic encryption backend
//!
//! The pipeline never looks inside keys or ciphertexts; everything it needs
//! goes through [`CryptoProvider`]. The provider is the only source of
//! randomness and of the scheme's correctness guarantees.

use crate::error::ProviderResult;
use crate::types::{CryptoParameters, SchemeParameters};

/// Additively homomorphic encryption backend
pub trait CryptoProvider: Sync {
    type Context: Send + Sync;
    type PublicKey: Send + Sync;
    type SecretKey: Send + Sync;
    type Plaintext: Send + Sync;
    type Ciphertext: Clone + Send + Sync;

    /// Build a context for the requested parameters
    fn setup_context(&self, params: &SchemeParameters) -> ProviderResult<Self::Context>;

    /// Parameters actually in effect for a context, as recorded in metadata
    fn parameters(&self, ctx: &Self::Context) -> CryptoParameters;

    fn generate_key_pair(
        &self,
        ctx: &Self::Context,
    ) -> ProviderResult<(Self::PublicKey, Self::SecretKey)>;

    fn encode(&self, ctx: &Self::Context, value: u64) -> ProviderResult<Self::Plaintext>;

    fn encrypt(
        &self,
        ctx: &Self::Context,
        pk: &Self::PublicKey,
        pt: &Self::Plaintext,
    ) -> ProviderResult<Self::Ciphertext>;

    /// Ciphertext of the sum of the two plaintexts
    fn homomorphic_add(
        &self,
        ctx: &Self::Context,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
    ) -> ProviderResult<Self::Ciphertext>;

    fn decrypt(
        &self,
        ctx: &Self::Context,
        sk: &Self::SecretKey,
        ct: &Self::Ciphertext,
    ) -> ProviderResult<Self::Plaintext>;

    fn decode(&self, ctx: &Self::Context, pt: &Self::Plaintext) -> ProviderResult<u64>;

    fn serialize(&self, ctx: &Self::Context, ct: &Self::Ciphertext) -> ProviderResult<Vec<u8>>;

    fn deserialize(&self, ctx: &Self::Context, bytes: &[u8]) -> ProviderResult<Self::Ciphertext>;

    fn serialize_public_key(
        &self,
        ctx: &Self::Context,
        pk: &Self::PublicKey,
    ) -> ProviderResult<Vec<u8>>;

    fn serialize_secret_key(
        &self,
        ctx: &Self::Context,
        sk: &Self::SecretKey,
    ) -> ProviderResult<Vec<u8>>;

    /// Convenience: encode then encrypt
    fn encrypt_value(
        &self,
        ctx: &Self::Context,
        pk: &Self::PublicKey,
        value: u64,
    ) -> ProviderResult<Self::Ciphertext> {
        let pt = self.encode(ctx, value)?;
        self.encrypt(ctx, pk, &pt)
    }

    /// Convenience: decrypt then decode
    fn decrypt_value(
        &self,
        ctx: &Self::Context,
        sk: &Self::SecretKey,
        ct: &Self::Ciphertext,
    ) -> ProviderResult<u64> {
        let pt = self.decrypt(ctx, sk, ct)?;
        self.decode(ctx, &pt)
    }
}
