//! Short code generation.
//!
//! Generators only make collisions unlikely. Uniqueness is enforced by the
//! link store, and callers retry with a fresh code when an insert conflicts.

use rand::RngExt;

/// URL-safe 64-symbol alphabet.
pub const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Longest code accepted on the redirect path.
pub const MAX_CODE_LENGTH: usize = 32;

pub const DEFAULT_CODE_LENGTH: usize = 8;

pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Draws `length` symbols uniformly from [`ALPHABET`] using the thread-local RNG.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

/// Cheap shape check so malformed codes never reach the store.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CODE_LENGTH
        && code.bytes().all(|b| ALPHABET.contains(&b))
}
