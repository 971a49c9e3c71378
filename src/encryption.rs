//! Additive ElGamal backend implementing [`CryptoProvider`]

use std::collections::HashMap;
use std::fmt;

use log::debug;
use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::{ProviderError, ProviderResult};
use crate::keys::{Group, KeyPair, PublicKey, SecretKey};
use crate::provider::CryptoProvider;
use crate::types::{CryptoParameters, Scheme, SchemeParameters};
use crate::utils::{mod_exp, mod_inverse, random_in_range};

/// Smallest modulus accepted for a given security level (NIST SP 800-57)
pub fn required_modulus_bits(security_bits: u32) -> ProviderResult<u64> {
    match security_bits {
        0..=56 => Ok(512),
        57..=80 => Ok(1024),
        81..=112 => Ok(2048),
        113..=128 => Ok(3072),
        129..=192 => Ok(7680),
        193..=256 => Ok(15360),
        _ => Err(ProviderError::UnsupportedSecurityLevel(security_bits)),
    }
}

/// Encoded plaintext: g^m mod p
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plaintext(pub(crate) BigUint);

/// ElGamal ciphertext (c1, c2) = (g^k, g^m * h^k)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    pub(crate) c1: BigUint,
    pub(crate) c2: BigUint,
}

impl Ciphertext {
    pub fn c1(&self) -> &BigUint {
        &self.c1
    }

    pub fn c2(&self) -> &BigUint {
        &self.c2
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ciphertext({} bytes)",
            self.c1.to_bytes_be().len() + self.c2.to_bytes_be().len()
        )
    }
}

/// Baby-step giant-step table for discrete logs in [0, max]
#[derive(Clone, Debug)]
pub struct DiscreteLogTable {
    baby_steps: HashMap<BigUint, u64>,
    giant_step_inv: BigUint,
    step: u64,
    max: u64,
}

impl DiscreteLogTable {
    pub fn new(group: &Group, max: u64) -> ProviderResult<Self> {
        let step = ((max as f64 + 1.0).sqrt().ceil() as u64).max(1);

        let mut baby_steps = HashMap::with_capacity(step as usize);
        let mut current = BigUint::one();
        for j in 0..step {
            baby_steps.entry(current.clone()).or_insert(j);
            current = (&current * &group.g) % &group.p;
        }

        // current == g^step here
        let giant_step_inv =
            mod_inverse(&current, &group.p).ok_or(ProviderError::ModularInverseError)?;

        Ok(DiscreteLogTable {
            baby_steps,
            giant_step_inv,
            step,
            max,
        })
    }

    /// Find m in [0, max] with g^m == value
    pub fn solve(&self, value: &BigUint, p: &BigUint) -> ProviderResult<u64> {
        let mut gamma = value.clone();
        for i in 0..=self.step {
            if let Some(&j) = self.baby_steps.get(&gamma) {
                let m = i * self.step + j;
                if m <= self.max {
                    return Ok(m);
                }
                break;
            }
            gamma = (&gamma * &self.giant_step_inv) % p;
        }

        Err(ProviderError::DiscreteLog(format!(
            "No plaintext in [0, {}] matches",
            self.max
        )))
    }
}

/// Context for the ElGamal backend: group plus decoding table
#[derive(Clone, Debug)]
pub struct ElGamalContext {
    params: SchemeParameters,
    group: Group,
    dlog: DiscreteLogTable,
}

impl ElGamalContext {
    /// Rebuild the context of a finished run from its persisted public key
    pub fn from_public_key(params: &SchemeParameters, pk: &PublicKey) -> ProviderResult<Self> {
        pk.validate()?;
        let group = pk.group.clone();
        let dlog = DiscreteLogTable::new(&group, params.max_plaintext())?;
        Ok(ElGamalContext {
            params: SchemeParameters {
                modulus_bits: group.bit_size(),
                ..params.clone()
            },
            group,
            dlog,
        })
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn params(&self) -> &SchemeParameters {
        &self.params
    }

    fn check_element(&self, value: &BigUint, what: &str) -> ProviderResult<()> {
        if value.is_zero() || value >= &self.group.p {
            return Err(ProviderError::MalformedCiphertext(format!(
                "{} outside (0, p)",
                what
            )));
        }
        Ok(())
    }
}

/// Exponential ElGamal over a prime-order subgroup
#[derive(Clone, Copy, Debug, Default)]
pub struct ElGamalProvider;

impl ElGamalProvider {
    pub fn new() -> Self {
        ElGamalProvider
    }

    /// Encrypt with caller-chosen randomness k
    pub fn encrypt_with_randomness(
        &self,
        ctx: &ElGamalContext,
        pk: &PublicKey,
        pt: &Plaintext,
        k: &BigUint,
    ) -> Ciphertext {
        let p = &ctx.group.p;
        let c1 = mod_exp(&ctx.group.g, k, p);
        let h_k = mod_exp(&pk.h, k, p);
        let c2 = (&pt.0 * h_k) % p;
        Ciphertext { c1, c2 }
    }
}

impl CryptoProvider for ElGamalProvider {
    type Context = ElGamalContext;
    type PublicKey = PublicKey;
    type SecretKey = SecretKey;
    type Plaintext = Plaintext;
    type Ciphertext = Ciphertext;

    fn setup_context(&self, params: &SchemeParameters) -> ProviderResult<ElGamalContext> {
        match params.scheme {
            Scheme::ExponentialElGamal => {}
        }

        let required = required_modulus_bits(params.security_bits)?;
        if params.modulus_bits < required {
            return Err(ProviderError::InsufficientModulus {
                security_bits: params.security_bits,
                modulus_bits: params.modulus_bits,
                required,
            });
        }

        // Baby-step table grows with sqrt(2^bits)
        if params.plaintext_modulus_bits == 0 || params.plaintext_modulus_bits > 40 {
            return Err(ProviderError::InvalidParameter(format!(
                "plaintext_modulus_bits must be in 1..=40, got {}",
                params.plaintext_modulus_bits
            )));
        }

        debug!(
            "Generating {}-bit group (safe prime: {})",
            params.modulus_bits, params.safe_prime
        );
        let group = Group::generate(params.modulus_bits, params.safe_prime)?;
        let dlog = DiscreteLogTable::new(&group, params.max_plaintext())?;

        Ok(ElGamalContext {
            params: params.clone(),
            group,
            dlog,
        })
    }

    fn parameters(&self, ctx: &ElGamalContext) -> CryptoParameters {
        let mut reported = CryptoParameters::from(&ctx.params);
        reported.modulus_bits = ctx.group.bit_size();
        reported
    }

    fn generate_key_pair(&self, ctx: &ElGamalContext) -> ProviderResult<(PublicKey, SecretKey)> {
        let keypair = KeyPair::generate(&ctx.group)?;
        Ok((keypair.public_key, keypair.secret_key))
    }

    fn encode(&self, ctx: &ElGamalContext, value: u64) -> ProviderResult<Plaintext> {
        let max = ctx.params.max_plaintext();
        if value > max {
            return Err(ProviderError::PlaintextOutOfRange { value, max });
        }
        Ok(Plaintext(mod_exp(
            &ctx.group.g,
            &BigUint::from(value),
            &ctx.group.p,
        )))
    }

    fn encrypt(
        &self,
        ctx: &ElGamalContext,
        pk: &PublicKey,
        pt: &Plaintext,
    ) -> ProviderResult<Ciphertext> {
        if pk.group != ctx.group {
            return Err(ProviderError::InvalidParameter(
                "Public key belongs to a different group".to_string(),
            ));
        }
        let k = random_in_range(&ctx.group.q);
        Ok(self.encrypt_with_randomness(ctx, pk, pt, &k))
    }

    fn homomorphic_add(
        &self,
        ctx: &ElGamalContext,
        a: &Ciphertext,
        b: &Ciphertext,
    ) -> ProviderResult<Ciphertext> {
        // Component-wise product: g^(m1+m2) * h^(k1+k2)
        let p = &ctx.group.p;
        Ok(Ciphertext {
            c1: (&a.c1 * &b.c1) % p,
            c2: (&a.c2 * &b.c2) % p,
        })
    }

    fn decrypt(
        &self,
        ctx: &ElGamalContext,
        sk: &SecretKey,
        ct: &Ciphertext,
    ) -> ProviderResult<Plaintext> {
        let p = &ctx.group.p;
        if &sk.p != p {
            return Err(ProviderError::InvalidParameter(
                "Secret key belongs to a different group".to_string(),
            ));
        }

        let s = mod_exp(&ct.c1, &sk.x, p);
        let s_inv = mod_inverse(&s, p).ok_or(ProviderError::ModularInverseError)?;
        Ok(Plaintext((&ct.c2 * s_inv) % p))
    }

    fn decode(&self, ctx: &ElGamalContext, pt: &Plaintext) -> ProviderResult<u64> {
        ctx.dlog.solve(&pt.0, &ctx.group.p)
    }

    fn serialize(&self, ctx: &ElGamalContext, ct: &Ciphertext) -> ProviderResult<Vec<u8>> {
        let width = ctx.group.element_len();
        let mut out = vec![0u8; 2 * width];
        for (slot, value) in out.chunks_mut(width).zip([&ct.c1, &ct.c2]) {
            let bytes = value.to_bytes_be();
            if bytes.len() > width {
                return Err(ProviderError::MalformedCiphertext(
                    "Component wider than modulus".to_string(),
                ));
            }
            slot[width - bytes.len()..].copy_from_slice(&bytes);
        }
        Ok(out)
    }

    fn deserialize(&self, ctx: &ElGamalContext, bytes: &[u8]) -> ProviderResult<Ciphertext> {
        let width = ctx.group.element_len();
        if bytes.len() != 2 * width {
            return Err(ProviderError::MalformedCiphertext(format!(
                "Expected {} bytes, got {}",
                2 * width,
                bytes.len()
            )));
        }

        let (c1, c2) = bytes.split_at(width);
        let ct = Ciphertext {
            c1: BigUint::from_bytes_be(c1),
            c2: BigUint::from_bytes_be(c2),
        };
        ctx.check_element(&ct.c1, "c1")?;
        ctx.check_element(&ct.c2, "c2")?;
        Ok(ct)
    }

    fn serialize_public_key(&self, _ctx: &ElGamalContext, pk: &PublicKey) -> ProviderResult<Vec<u8>> {
        Ok(pk.to_bytes())
    }

    fn serialize_secret_key(&self, _ctx: &ElGamalContext, sk: &SecretKey) -> ProviderResult<Vec<u8>> {
        Ok(sk.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ElGamalProvider, ElGamalContext, PublicKey, SecretKey) {
        let provider = ElGamalProvider::new();
        let ctx = provider
            .setup_context(&SchemeParameters::for_testing())
            .unwrap();
        let (pk, sk) = provider.generate_key_pair(&ctx).unwrap();
        (provider, ctx, pk, sk)
    }

    #[test]
    fn test_encryption_decryption() {
        let (provider, ctx, pk, sk) = setup();

        for value in [0u64, 1, 42, 1000, (1 << 20) - 1] {
            let ct = provider.encrypt_value(&ctx, &pk, value).unwrap();
            assert_eq!(provider.decrypt_value(&ctx, &sk, &ct).unwrap(), value);
        }
    }

    #[test]
    fn test_encryption_is_probabilistic() {
        let (provider, ctx, pk, sk) = setup();
        let pt = provider.encode(&ctx, 1).unwrap();

        let ct1 = provider.encrypt(&ctx, &pk, &pt).unwrap();
        let ct2 = provider.encrypt(&ctx, &pk, &pt).unwrap();
        assert_ne!(ct1, ct2);
        assert_eq!(provider.decrypt_value(&ctx, &sk, &ct1).unwrap(), 1);
        assert_eq!(provider.decrypt_value(&ctx, &sk, &ct2).unwrap(), 1);
    }

    #[test]
    fn test_homomorphic_addition() {
        let (provider, ctx, pk, sk) = setup();

        let ct1 = provider.encrypt_value(&ctx, &pk, 15).unwrap();
        let ct2 = provider.encrypt_value(&ctx, &pk, 25).unwrap();
        let sum = provider.homomorphic_add(&ctx, &ct1, &ct2).unwrap();

        assert_eq!(provider.decrypt_value(&ctx, &sk, &sum).unwrap(), 40);
    }

    #[test]
    fn test_encode_range() {
        let (provider, ctx, _, _) = setup();
        match provider.encode(&ctx, 1 << 20) {
            Err(ProviderError::PlaintextOutOfRange { max, .. }) => assert_eq!(max, (1 << 20) - 1),
            other => panic!("Expected PlaintextOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_out_of_range() {
        let (provider, ctx, _, _) = setup();
        // g^(2^21) lies outside the decodable window
        let pt = Plaintext(mod_exp(
            &ctx.group.g,
            &BigUint::from(1u64 << 21),
            &ctx.group.p,
        ));
        assert!(matches!(
            provider.decode(&ctx, &pt),
            Err(ProviderError::DiscreteLog(_))
        ));
    }

    #[test]
    fn test_serialization_round_trip() {
        let (provider, ctx, pk, sk) = setup();
        let ct = provider.encrypt_value(&ctx, &pk, 7).unwrap();

        let bytes = provider.serialize(&ctx, &ct).unwrap();
        assert_eq!(bytes.len(), 2 * ctx.group.element_len());

        let restored = provider.deserialize(&ctx, &bytes).unwrap();
        assert_eq!(restored, ct);
        assert_eq!(provider.decrypt_value(&ctx, &sk, &restored).unwrap(), 7);
    }

    #[test]
    fn test_deserialize_rejects_malformed() {
        let (provider, ctx, pk, _) = setup();
        let bytes = provider
            .serialize(&ctx, &provider.encrypt_value(&ctx, &pk, 1).unwrap())
            .unwrap();

        assert!(provider.deserialize(&ctx, &bytes[1..]).is_err());
        assert!(provider.deserialize(&ctx, &vec![0u8; bytes.len()]).is_err());
        assert!(provider.deserialize(&ctx, &vec![0xffu8; bytes.len()]).is_err());
    }

    #[test]
    fn test_security_level_enforced() {
        let provider = ElGamalProvider::new();
        let params = SchemeParameters {
            security_bits: 128,
            ..SchemeParameters::for_testing()
        };
        match provider.setup_context(&params) {
            Err(ProviderError::InsufficientModulus { required, .. }) => assert_eq!(required, 3072),
            other => panic!("Expected InsufficientModulus, got {:?}", other.map(|_| ())),
        }

        assert!(required_modulus_bits(512).is_err());
    }

    #[test]
    fn test_reported_parameters() {
        let (provider, ctx, _, _) = setup();
        let reported = provider.parameters(&ctx);

        assert_eq!(reported.scheme, "ElGamal-Exp");
        assert_eq!(reported.polynomial_degree, None);
        assert_eq!(reported.plaintext_modulus_bits, 20);
        assert_eq!(reported.modulus_bits, 512);
    }
}
