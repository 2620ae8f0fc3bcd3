//! Random fixture data for tests

use rand::Rng;
use rand::seq::SliceRandom;

use crate::ledger::models::{CreateAccountParams, Currency};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Random integer in `min..=max`
pub fn random_int(min: i64, max: i64) -> i64 {
    rand::thread_rng().gen_range(min..=max)
}

/// Random lowercase string of length `n`
pub fn random_string(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

pub fn random_owner() -> String {
    random_string(6)
}

/// Random positive amount in minor units
pub fn random_money() -> i64 {
    random_int(1, 1000)
}

pub fn random_currency() -> Currency {
    *Currency::ALL
        .choose(&mut rand::thread_rng())
        .unwrap_or(&Currency::Usd)
}

pub fn random_account_params() -> CreateAccountParams {
    CreateAccountParams {
        owner: random_owner(),
        balance: random_money(),
        currency: random_currency(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ranges() {
        for _ in 0..100 {
            let n = random_int(3, 5);
            assert!((3..=5).contains(&n));
            assert!(random_money() > 0);
        }
    }

    #[test]
    fn test_random_owner_shape() {
        let owner = random_owner();
        assert_eq!(owner.len(), 6);
        assert!(owner.chars().all(|c| c.is_ascii_lowercase()));
    }
}
