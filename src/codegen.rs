use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Issues the short codes shown on the attendance QR display.
///
/// Codes only need to differ from the one they replace; collisions across
/// unrelated sessions are harmless because validation compares against a
/// single session's `current_code`.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

pub struct RandomCodeGenerator {
    rng: Mutex<StdRng>,
    length: usize,
}

impl RandomCodeGenerator {
    pub fn from_entropy(length: usize) -> Self {
        Self::with_rng(StdRng::from_entropy(), length)
    }

    #[cfg(test)]
    pub fn seeded(seed: u64, length: usize) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), length)
    }

    fn with_rng(rng: StdRng, length: usize) -> Self {
        Self {
            rng: Mutex::new(rng),
            length: length.max(1),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::from_entropy(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..self.length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
pub use sequence::SequenceCodeGenerator;
