//! Generators produce the opaque strings behind codes, tokens and transaction ids.
//!
//! In short, every credential handed out by this server is an unguessable random
//! string; nothing about the grant is recoverable from the string itself, recovery is
//! always by ledger lookup. The `RandomGenerator` draws from the operating system
//! entropy source and will always succeed.

use super::grant::Grant;

use std::rc::Rc;
use std::sync::Arc;

use base64::encode;
use rand::{rngs::OsRng, RngCore};

/// Generic token for a specific grant.
///
/// The interface is shared between authorization codes and bearer tokens.
///
/// ## Requirements on implementations
///
/// When queried without repetition (users will change the `usage` counter each time),
/// this method MUST be indistinguishable from a random function. No sequential or
/// otherwise predictable values may be produced, as the resulting string is the sole
/// proof of possession of the grant.
pub trait TagGrant {
    /// Produce the opaque string for this grant, for example from random bytes.
    fn tag(&mut self, usage: u64, grant: &Grant) -> Result<String, ()>;
}

/// Generates tokens from cryptographically strong random bytes.
///
/// Each byte is chosen by the operating system generator (`rand::rngs::OsRng`). The
/// result is base64 encoded, so a 16 byte generator yields codes of effectively 128
/// bits of entropy.
pub struct RandomGenerator {
    random: OsRng,
    len: usize,
}

impl RandomGenerator {
    /// Generates tokens with a specific byte length.
    pub fn new(length: usize) -> RandomGenerator {
        RandomGenerator {
            random: OsRng {},
            len: length,
        }
    }

    /// Produce one fresh random string, independent of any grant.
    ///
    /// Used directly for transaction identifiers, which exist before a grant does.
    pub fn generate(&self) -> String {
        let mut result = vec![0; self.len];
        let mut rnd = self.random;
        rnd.try_fill_bytes(result.as_mut_slice())
            .expect("Failed to generate random token");
        encode(&result)
    }
}

impl<'a, T: TagGrant + ?Sized + 'a> TagGrant for Box<T> {
    fn tag(&mut self, counter: u64, grant: &Grant) -> Result<String, ()> {
        (&mut **self).tag(counter, grant)
    }
}

impl<'a, T: TagGrant + ?Sized + 'a> TagGrant for &'a mut T {
    fn tag(&mut self, counter: u64, grant: &Grant) -> Result<String, ()> {
        (&mut **self).tag(counter, grant)
    }
}

impl TagGrant for RandomGenerator {
    fn tag(&mut self, _: u64, _: &Grant) -> Result<String, ()> {
        Ok(self.generate())
    }
}

impl<'a> TagGrant for &'a RandomGenerator {
    fn tag(&mut self, _: u64, _: &Grant) -> Result<String, ()> {
        Ok(self.generate())
    }
}

impl TagGrant for Rc<RandomGenerator> {
    fn tag(&mut self, _: u64, _: &Grant) -> Result<String, ()> {
        Ok(self.generate())
    }
}

impl TagGrant for Arc<RandomGenerator> {
    fn tag(&mut self, _: u64, _: &Grant) -> Result<String, ()> {
        Ok(self.generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_and_unpredictable() {
        let generator = RandomGenerator::new(16);
        let one = generator.generate();
        let two = generator.generate();
        assert_ne!(one, two);
        // 16 bytes of entropy encode to at least 22 base64 characters.
        assert!(one.len() >= 22);
    }

    #[test]
    #[allow(dead_code, unused)]
    fn assert_send_sync_static() {
        fn uses<T: Send + Sync + 'static>(arg: T) {}
        let _ = uses(RandomGenerator::new(16));
    }
}
