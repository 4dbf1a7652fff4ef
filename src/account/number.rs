//! Account number generation.

use rand::Rng;
use rand::rngs::OsRng;

/// Source of new account numbers.
///
/// Numbers only need to be unlikely to collide: the insert detects a taken
/// number and asks for another one.
pub trait AccountNumberGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random numeric account numbers drawn from the OS RNG.
#[derive(Debug, Clone)]
pub struct RandomAccountNumber {
    length: usize,
}

impl RandomAccountNumber {
    /// Create a new [`RandomAccountNumber`] of `length` digits.
    ///
    /// # Panics
    ///
    /// Panics if `length` is zero.
    pub fn new(length: usize) -> Self {
        assert!(length > 0, "account numbers need at least one digit");
        Self { length }
    }
}

impl AccountNumberGenerator for RandomAccountNumber {
    fn generate(&self) -> String {
        let mut rng = OsRng;
        // no leading zero.
        let mut number = String::with_capacity(self.length);
        number.push(char::from(b'0' + rng.gen_range(1..=9u8)));
        for _ in 1..self.length {
            number.push(char::from(b'0' + rng.gen_range(0..=9u8)));
        }
        number
    }
}
