//! Short code generation strategies.

use rand::distributions::{Alphanumeric, DistString};

use crate::{CodeGenerator, ShortCode};

/// Length of generated codes when no custom code is supplied.
pub const DEFAULT_CODE_LEN: usize = 6;

/// Random alphanumeric codes. Collisions are possible and handled by the
/// caller, which checks the store and retries.
#[derive(Clone, Copy, Debug)]
pub struct RandomCodeGenerator {
    len: usize,
}

impl RandomCodeGenerator {
    pub fn new(len: usize) -> Self {
        Self { len: len.max(1) }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LEN)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn next_code(&self) -> ShortCode {
        let raw = Alphanumeric.sample_string(&mut rand::thread_rng(), self.len);
        ShortCode::from_generated(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_have_requested_length_and_charset() {
        let g = RandomCodeGenerator::default();
        for _ in 0..50 {
            let c = g.next_code();
            assert_eq!(c.as_str().len(), DEFAULT_CODE_LEN);
            assert!(c.as_str().chars().all(|ch| ch.is_ascii_alphanumeric()));
        }
    }
}
