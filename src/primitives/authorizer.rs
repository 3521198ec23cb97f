//! Authorizers create and redeem authorization codes.
//!
//! The role of an authorizer is the ledger of authorization codes: issuing a fresh,
//! unguessable code bound to a grant, and redeeming that code exactly once. Redemption
//! and invalidation are one operation, so two racing exchange requests can never both
//! observe the same code as valid.
use std::collections::HashMap;
use std::sync::{MutexGuard, RwLockWriteGuard};

use chrono::{Duration, Utc};

use super::grant::Grant;
use super::generator::TagGrant;

/// Authorizers create and manage authorization codes.
///
/// The authorization code can be traded for a bearer token at the token endpoint.
pub trait Authorizer {
    /// Create a code which allows retrieval of a bearer token at a later time.
    fn authorize(&mut self, grant: Grant) -> Result<String, ()>;

    /// Retrieve the parameters associated with a token, invalidating the code in the
    /// process. In particular, a code should not be usable twice after this function.
    fn extract(&mut self, code: &str) -> Result<Option<Grant>, ()>;
}

/// An in-memory hash map.
///
/// This authorizer saves a mapping of generated strings to their associated grants.
/// The generator is itself trait based and can be chosen during construction. It is
/// assumed to not be possible for two different grants to generate the same token in
/// the issuer.
pub struct AuthMap<I: TagGrant = Box<dyn TagGrant + Send + Sync + 'static>> {
    tagger: I,
    usage: u64,
    validity: Option<Duration>,
    tokens: HashMap<String, Grant>,
}

impl<I: TagGrant> AuthMap<I> {
    /// Create an authorizer generating tokens with the `tagger`.
    ///
    /// The token map is initially empty and is filled by methods provided in its
    /// [`Authorizer`] implementation.
    ///
    /// [`Authorizer`]: trait.Authorizer.html
    pub fn new(tagger: I) -> Self {
        AuthMap {
            tagger,
            usage: 0,
            validity: None,
            tokens: HashMap::new(),
        }
    }

    /// Have newly issued codes expire after `duration`.
    ///
    /// By default codes do not expire. An expired code behaves exactly like an unknown
    /// one during extraction.
    pub fn valid_for(&mut self, duration: Duration) {
        self.validity = Some(duration);
    }
}

impl<I: TagGrant> Authorizer for AuthMap<I> {
    fn authorize(&mut self, mut grant: Grant) -> Result<String, ()> {
        // The (usage, grant) tuple needs to be unique. Since this wraps after 2^64
        // operations, the validity check against all other grants is necessary.
        let next_usage = self.usage.wrapping_add(1);

        if let Some(validity) = self.validity {
            grant.until = Some(Utc::now() + validity);
        }

        let token = self.tagger.tag(next_usage - 1, &grant)?;
        if self.tokens.contains_key(&token) {
            return Err(());
        }

        self.tokens.insert(token.clone(), grant);
        self.usage = next_usage;
        Ok(token)
    }

    fn extract(&mut self, grant: &str) -> Result<Option<Grant>, ()> {
        let extracted = self.tokens.remove(grant);
        match extracted {
            Some(ref grant) => match grant.until {
                Some(until) if until < Utc::now() => Ok(None),
                _ => Ok(extracted),
            },
            None => Ok(None),
        }
    }
}

impl<'a, A: Authorizer + ?Sized> Authorizer for &'a mut A {
    fn authorize(&mut self, grant: Grant) -> Result<String, ()> {
        (**self).authorize(grant)
    }

    fn extract(&mut self, code: &str) -> Result<Option<Grant>, ()> {
        (**self).extract(code)
    }
}

impl<A: Authorizer + ?Sized> Authorizer for Box<A> {
    fn authorize(&mut self, grant: Grant) -> Result<String, ()> {
        (**self).authorize(grant)
    }

    fn extract(&mut self, code: &str) -> Result<Option<Grant>, ()> {
        (**self).extract(code)
    }
}

impl<'a, A: Authorizer + ?Sized + 'a> Authorizer for MutexGuard<'a, A> {
    fn authorize(&mut self, grant: Grant) -> Result<String, ()> {
        (**self).authorize(grant)
    }

    fn extract(&mut self, code: &str) -> Result<Option<Grant>, ()> {
        (**self).extract(code)
    }
}

impl<'a, A: Authorizer + ?Sized + 'a> Authorizer for RwLockWriteGuard<'a, A> {
    fn authorize(&mut self, grant: Grant) -> Result<String, ()> {
        (**self).authorize(grant)
    }

    fn extract(&mut self, code: &str) -> Result<Option<Grant>, ()> {
        (**self).extract(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::generator::RandomGenerator;
    use crate::primitives::grant::Identity;

    fn grant_template() -> Grant {
        Grant {
            owner_id: "3".to_string(),
            client_id: "3".to_string(),
            scope: "/authenticate".parse().unwrap(),
            redirect_uri: Some("https://localhost/oauth/callback".parse().unwrap()),
            identity: Some(Identity {
                username: "o2r-author".to_string(),
                orcid: "0000-0001-6225-344X".to_string(),
            }),
            until: None,
        }
    }

    /// Tests the simplest invariants that should be upheld by all authorizers.
    ///
    /// This create a code, without any extras and checks that it can be extracted
    /// exactly once, even in the presence of other tokens.
    pub fn simple_test_suite(authorizer: &mut dyn Authorizer) {
        let grant = grant_template();

        let token = authorizer
            .authorize(grant.clone())
            .expect("Authorization should not fail here");
        let recovered_grant = authorizer
            .extract(&token)
            .expect("Primitive failed extracting grant")
            .expect("Could not extract grant for valid token");

        assert_eq!(grant, recovered_grant);

        if let Ok(Some(_)) = authorizer.extract(&token) {
            panic!("Token must only be usable once");
        }

        // Authorize the same token again.
        let token_again = authorizer
            .authorize(grant.clone())
            .expect("Authorization should not fail here");
        // We don't produce the same token twice.
        assert_ne!(token, token_again);
    }

    #[test]
    fn random_test_suite() {
        let mut storage = AuthMap::new(RandomGenerator::new(16));
        simple_test_suite(&mut storage);
    }

    #[test]
    fn expired_codes_are_unknown() {
        let mut storage = AuthMap::new(RandomGenerator::new(16));
        storage.valid_for(Duration::seconds(-1));

        let token = storage
            .authorize(grant_template())
            .expect("Authorization should not fail here");
        assert_eq!(storage.extract(&token), Ok(None));
    }

    #[test]
    #[allow(dead_code, unused)]
    fn assert_send_sync_static() {
        fn uses<T: Send + Sync + 'static>(arg: T) {}
        let _ = uses(AuthMap::new(RandomGenerator::new(16)));
    }
}
