//! Number-theoretic helpers for the ElGamal backend

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::thread_rng;

use crate::error::{ProviderError, ProviderResult};

/// Odd primes below this bound are used to sieve candidates before Miller-Rabin
const SIEVE_LIMIT: u32 = 2000;

/// Modular exponentiation: base^exp mod modulus
pub fn mod_exp(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exp, modulus)
}

/// Modular inverse via the extended Euclidean algorithm
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let a = BigInt::from(a.clone());
    let m = BigInt::from(m.clone());
    let egcd = a.extended_gcd(&m);

    if !egcd.gcd.is_one() {
        return None;
    }

    egcd.x.mod_floor(&m).to_biguint()
}

/// Generate a safe prime p = 2q + 1 of exactly `bit_size` bits, returning (p, q)
pub fn generate_safe_prime(bit_size: u64, rounds: usize) -> ProviderResult<(BigUint, BigUint)> {
    if bit_size < 512 {
        return Err(ProviderError::InvalidKeySize(bit_size));
    }

    let small_primes = small_primes();
    let mut rng = thread_rng();
    let max_iterations = 5_000_000;

    for _ in 0..max_iterations {
        // q has bit_size - 1 bits so that p = 2q + 1 has exactly bit_size bits
        let mut q = rng.gen_biguint(bit_size - 1);
        q |= BigUint::one();
        q |= BigUint::one() << (bit_size - 2);

        // Reject when q or 2q + 1 has a small factor
        let sieved = small_primes.iter().any(|&sp| {
            let r = (&q % sp).to_u32().unwrap_or(0);
            r == 0 || r == (sp - 1) / 2
        });
        if sieved {
            continue;
        }

        if !is_probable_prime(&q, rounds) {
            continue;
        }

        let p = &q * 2u32 + 1u32;
        if is_probable_prime(&p, rounds) {
            return Ok((p, q));
        }
    }

    Err(ProviderError::CryptoError(format!(
        "Failed to generate {}-bit safe prime after {} iterations",
        bit_size, max_iterations
    )))
}

/// Generate a random prime of exactly `bit_size` bits (not necessarily safe)
pub fn generate_prime(bit_size: u64, rounds: usize) -> ProviderResult<BigUint> {
    if bit_size < 512 {
        return Err(ProviderError::InvalidKeySize(bit_size));
    }

    let small_primes = small_primes();
    let mut rng = thread_rng();
    let max_iterations = 100_000;

    for _ in 0..max_iterations {
        let mut candidate = rng.gen_biguint(bit_size);
        candidate |= BigUint::one();
        candidate |= BigUint::one() << (bit_size - 1);

        if small_primes
            .iter()
            .any(|&sp| (&candidate % sp).is_zero())
        {
            continue;
        }

        if is_probable_prime(&candidate, rounds) {
            return Ok(candidate);
        }
    }

    Err(ProviderError::CryptoError(format!(
        "Failed to generate {}-bit prime after {} iterations",
        bit_size, max_iterations
    )))
}

/// Miller-Rabin primality test
pub fn is_probable_prime(n: &BigUint, k: usize) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if n < &two {
        return false;
    }
    if n == &two || n == &three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    let mut rng = thread_rng();
    let n_minus_1 = n - BigUint::one();
    let (s, d) = factor_powers_of_two(&n_minus_1);

    'witness: for _ in 0..k {
        let a = rng.gen_biguint_range(&two, &n_minus_1);
        let mut x = mod_exp(&a, &d, n);

        if x.is_one() || x == n_minus_1 {
            continue;
        }

        for _ in 0..s - 1 {
            x = mod_exp(&x, &two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// Factor out powers of 2 from n, returning (s, d) with n = 2^s * d
pub fn factor_powers_of_two(n: &BigUint) -> (u64, BigUint) {
    let mut s = 0;
    let mut d = n.clone();

    while d.is_even() && !d.is_zero() {
        d >>= 1;
        s += 1;
    }

    (s, d)
}

/// Random element in [1, n)
pub fn random_in_range(n: &BigUint) -> BigUint {
    let mut rng = thread_rng();
    rng.gen_biguint_range(&BigUint::one(), n)
}

/// Odd primes below `SIEVE_LIMIT`
fn small_primes() -> Vec<u32> {
    let limit = SIEVE_LIMIT as usize;
    let mut composite = vec![false; limit];
    let mut primes = Vec::new();

    for i in 2..limit {
        if composite[i] {
            continue;
        }
        if i > 2 {
            primes.push(i as u32);
        }
        let mut j = i * i;
        while j < limit {
            composite[j] = true;
            j += i;
        }
    }

    primes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mod_inverse() {
        let a = BigUint::from(3u32);
        let m = BigUint::from(11u32);
        let inv = mod_inverse(&a, &m).unwrap();

        assert_eq!((a * inv) % m, BigUint::one());
        assert!(mod_inverse(&BigUint::from(4u32), &BigUint::from(8u32)).is_none());
    }

    #[test]
    fn test_is_probable_prime() {
        for p in [2u32, 3, 5, 7, 11, 13, 7919] {
            assert!(is_probable_prime(&BigUint::from(p), 20), "{} is prime", p);
        }
        for c in [0u32, 1, 4, 6, 8, 9, 10, 12, 15, 561] {
            assert!(!is_probable_prime(&BigUint::from(c), 20), "{} is composite", c);
        }
    }

    #[test]
    fn test_small_primes_sieve() {
        let primes = small_primes();
        assert_eq!(&primes[..5], &[3, 5, 7, 11, 13]);
        assert!(primes.iter().all(|&p| p < SIEVE_LIMIT));
    }

    #[test]
    fn test_generate_prime_exact_bits() {
        let p = generate_prime(512, 20).unwrap();
        assert_eq!(p.bits(), 512);
        assert!(is_probable_prime(&p, 20));
        assert!(generate_prime(256, 20).is_err());
    }

    #[test]
    fn test_safe_prime_generation() {
        let (p, q) = generate_safe_prime(512, 20).unwrap();
        assert_eq!(p, &q * 2u32 + 1u32);
        assert_eq!(p.bits(), 512);
        assert!(is_probable_prime(&q, 20));
    }
}
