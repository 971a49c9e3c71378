//! ElGamal group and key management

use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::{ProviderError, ProviderResult};
use crate::utils::{generate_prime, generate_safe_prime, mod_exp, random_in_range};

/// Miller-Rabin rounds used during group generation
const PRIMALITY_ROUNDS: usize = 20;

/// Cyclic group parameters: modulus p and generator g of a subgroup of order q
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub(crate) p: BigUint,
    pub(crate) q: BigUint,
    pub(crate) g: BigUint,
}

impl Group {
    /// Generate a group with a modulus of `bit_size` bits.
    ///
    /// With `safe_prime` the modulus is p = 2q + 1 and g generates the
    /// order-q subgroup of quadratic residues. Otherwise p is a plain random
    /// prime and q = (p - 1) / 2, which is only suitable for tests.
    pub fn generate(bit_size: u64, safe_prime: bool) -> ProviderResult<Self> {
        let (p, q) = if safe_prime {
            generate_safe_prime(bit_size, PRIMALITY_ROUNDS)?
        } else {
            let p = generate_prime(bit_size, PRIMALITY_ROUNDS)?;
            let q = (&p - 1u32) / 2u32;
            (p, q)
        };

        let g = find_subgroup_generator(&p);
        let group = Group { p, q, g };
        group.validate()?;
        Ok(group)
    }

    /// Get the prime modulus
    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    /// Get the generator
    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// Bit size of the modulus
    pub fn bit_size(&self) -> u64 {
        self.p.bits()
    }

    /// Width in bytes of one serialized group element
    pub fn element_len(&self) -> usize {
        ((self.p.bits() + 7) / 8) as usize
    }

    pub fn validate(&self) -> ProviderResult<()> {
        if self.p <= BigUint::from(3u32) {
            return Err(ProviderError::InvalidParameter(
                "Modulus p must be > 3".to_string(),
            ));
        }

        if self.g <= BigUint::one() || self.g >= self.p {
            return Err(ProviderError::InvalidParameter(
                "Generator g must be in range (1, p)".to_string(),
            ));
        }

        if self.q.is_zero() || self.q >= self.p {
            return Err(ProviderError::InvalidParameter(
                "Subgroup order q must be in range (0, p)".to_string(),
            ));
        }

        Ok(())
    }
}

/// Squaring a random element lands in the subgroup of quadratic residues
fn find_subgroup_generator(p: &BigUint) -> BigUint {
    let two = BigUint::from(2u32);
    let p_minus_1 = p - BigUint::one();

    loop {
        let h = random_in_range(&p_minus_1);
        let g = mod_exp(&h, &two, p);
        if g > BigUint::one() {
            return g;
        }
    }
}

/// ElGamal public key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub(crate) group: Group,
    pub(crate) h: BigUint, // g^x mod p
}

impl PublicKey {
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// Get the public component (g^x mod p)
    pub fn public_component(&self) -> &BigUint {
        &self.h
    }

    pub fn validate(&self) -> ProviderResult<()> {
        self.group.validate()?;

        if self.h <= BigUint::one() || self.h >= self.group.p {
            return Err(ProviderError::InvalidParameter(
                "Public component h must be in range (1, p)".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize as length-prefixed big-endian integers: p, q, g, h
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for value in [&self.group.p, &self.group.q, &self.group.g, &self.h] {
            write_field(&mut out, value);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> ProviderResult<Self> {
        let mut reader = FieldReader::new(bytes);
        let p = reader.next_field()?;
        let q = reader.next_field()?;
        let g = reader.next_field()?;
        let h = reader.next_field()?;
        reader.finish()?;

        let key = PublicKey {
            group: Group { p, q, g },
            h,
        };
        key.validate()
            .map_err(|e| ProviderError::MalformedKey(e.to_string()))?;
        Ok(key)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.group.bit_size())
    }
}

/// ElGamal secret key
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    pub(crate) p: BigUint,
    pub(crate) x: BigUint,
}

impl SecretKey {
    /// Serialize as length-prefixed big-endian integers: p, x
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_field(&mut out, &self.p);
        write_field(&mut out, &self.x);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> ProviderResult<Self> {
        let mut reader = FieldReader::new(bytes);
        let p = reader.next_field()?;
        let x = reader.next_field()?;
        reader.finish()?;

        if x.is_zero() || x >= p {
            return Err(ProviderError::MalformedKey(
                "Secret exponent out of range".to_string(),
            ));
        }

        Ok(SecretKey { p, x })
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(***)")
    }
}

/// ElGamal key pair
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub secret_key: SecretKey,
}

impl KeyPair {
    /// Generate a key pair in the given group, x drawn from [1, q)
    pub fn generate(group: &Group) -> ProviderResult<Self> {
        let x = random_in_range(&group.q);
        let h = mod_exp(&group.g, &x, &group.p);

        let public_key = PublicKey {
            group: group.clone(),
            h,
        };
        public_key.validate()?;

        Ok(KeyPair {
            public_key,
            secret_key: SecretKey {
                p: group.p.clone(),
                x,
            },
        })
    }
}

fn write_field(out: &mut Vec<u8>, value: &BigUint) {
    let bytes = value.to_bytes_be();
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytes);
}

struct FieldReader<'a> {
    rest: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        FieldReader { rest: bytes }
    }

    fn next_field(&mut self) -> ProviderResult<BigUint> {
        if self.rest.len() < 4 {
            return Err(ProviderError::MalformedKey("Truncated length prefix".to_string()));
        }
        let (prefix, rest) = self.rest.split_at(4);
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

        if rest.len() < len {
            return Err(ProviderError::MalformedKey(format!(
                "Field of {} bytes truncated to {}",
                len,
                rest.len()
            )));
        }
        let (field, rest) = rest.split_at(len);
        self.rest = rest;
        Ok(BigUint::from_bytes_be(field))
    }

    fn finish(self) -> ProviderResult<()> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::MalformedKey(format!(
                "{} trailing bytes",
                self.rest.len()
            )))
        }
    }
}
