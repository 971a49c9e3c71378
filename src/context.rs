//! Per-run cryptographic context shared by every stage

use log::info;

use crate::artifacts::{ArtifactStore, PUBLIC_KEY_FILE, SECRET_KEY_FILE};
use crate::error::{ProviderResult, Result, Stage, TallyError};
use crate::provider::CryptoProvider;
use crate::types::{CryptoParameters, SchemeParameters};

/// Provider, context handle and key pair for one run.
///
/// Built once and borrowed read-only by every stage; the keys are never
/// regenerated or mutated after construction.
pub struct PipelineContext<'p, P: CryptoProvider> {
    provider: &'p P,
    context: P::Context,
    public_key: P::PublicKey,
    secret_key: P::SecretKey,
}

impl<'p, P: CryptoProvider> PipelineContext<'p, P> {
    /// Set up the provider context and generate a fresh key pair
    pub fn setup(provider: &'p P, params: &SchemeParameters) -> Result<Self> {
        info!(
            "Initializing {} context ({}-bit modulus, {}-bit security)",
            params.scheme, params.modulus_bits, params.security_bits
        );
        let context = provider
            .setup_context(params)
            .map_err(|e| TallyError::provider(Stage::Setup, e))?;
        let (public_key, secret_key) = provider
            .generate_key_pair(&context)
            .map_err(|e| TallyError::provider(Stage::Setup, e))?;
        info!("Key pair generated");

        Ok(PipelineContext {
            provider,
            context,
            public_key,
            secret_key,
        })
    }

    /// Write `publickey.key` and `secretkey.key`
    pub fn persist_keys(&self, store: &ArtifactStore) -> Result<()> {
        let pk = self
            .provider
            .serialize_public_key(&self.context, &self.public_key)
            .map_err(|e| TallyError::provider(Stage::KeyPersistence, e))?;
        let sk = self
            .provider
            .serialize_secret_key(&self.context, &self.secret_key)
            .map_err(|e| TallyError::provider(Stage::KeyPersistence, e))?;

        store.write(Stage::KeyPersistence, PUBLIC_KEY_FILE, &pk)?;
        store.write(Stage::KeyPersistence, SECRET_KEY_FILE, &sk)?;
        info!("Keys saved in {}", store.dir().display());
        Ok(())
    }

    pub fn provider(&self) -> &'p P {
        self.provider
    }

    pub fn context(&self) -> &P::Context {
        &self.context
    }

    pub fn public_key(&self) -> &P::PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &P::SecretKey {
        &self.secret_key
    }

    pub fn parameters(&self) -> CryptoParameters {
        self.provider.parameters(&self.context)
    }

    /// Parse a serialized ciphertext produced under this context
    pub fn deserialize(&self, bytes: &[u8]) -> ProviderResult<P::Ciphertext> {
        self.provider.deserialize(&self.context, bytes)
    }
}
