//! Identifier generation
//!
//! AWS-style ids are `{prefix}-{17 lowercase hex chars}`, GCP-style ids are
//! random 18-digit decimal numerals.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::error::Dialect;

/// Number of hex characters after the AWS prefix
const AWS_SUFFIX_LEN: usize = 17;

const GCP_ID_MIN: u64 = 100_000_000_000_000_000;
const GCP_ID_MAX: u64 = 999_999_999_999_999_999;

/// Random id source for one dialect
#[derive(Debug, Clone)]
pub struct IdGenerator {
    dialect: Dialect,
    rng: StdRng,
}

impl IdGenerator {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for tests
    pub fn seeded(dialect: Dialect, seed: u64) -> Self {
        Self {
            dialect,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Generate an id. The prefix is ignored for GCP numeric ids.
    pub fn generate(&mut self, prefix: &str) -> String {
        match self.dialect {
            Dialect::Aws => format!("{}-{}", prefix, self.hex_token(AWS_SUFFIX_LEN)),
            Dialect::Gcp => self.rng.gen_range(GCP_ID_MIN..=GCP_ID_MAX).to_string(),
        }
    }

    /// Generate an id the caller does not already hold
    pub fn generate_unused(&mut self, prefix: &str, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let id = self.generate(prefix);
            if !taken(&id) {
                return id;
            }
        }
    }

    /// Hex token used in GCP operation names
    pub fn hex_token(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| {
                let nibble: u32 = self.rng.gen_range(0..16);
                std::char::from_digit(nibble, 16).unwrap_or('0')
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aws_id_format() {
        let mut ids = IdGenerator::seeded(Dialect::Aws, 7);
        let id = ids.generate("vpc");
        let suffix = id.strip_prefix("vpc-").expect("prefix");
        assert_eq!(suffix.len(), 17);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_gcp_id_format() {
        let mut ids = IdGenerator::seeded(Dialect::Gcp, 7);
        let id = ids.generate("ignored");
        assert_eq!(id.len(), 18);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let mut a = IdGenerator::seeded(Dialect::Aws, 42);
        let mut b = IdGenerator::seeded(Dialect::Aws, 42);
        assert_eq!(a.generate("sg"), b.generate("sg"));
    }

    #[test]
    fn test_generate_unused_skips_taken() {
        let mut probe = IdGenerator::seeded(Dialect::Aws, 3);
        let first = probe.generate("subnet");

        let mut ids = IdGenerator::seeded(Dialect::Aws, 3);
        let id = ids.generate_unused("subnet", |candidate| candidate == first);
        assert_ne!(id, first);
    }
}
