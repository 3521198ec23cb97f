//! Generates bearer tokens and provides lookup of token metadata.
//!
//! The issuer is the ledger half holding access tokens. In contrast to authorization
//! codes, tokens are not consumed by lookup; resource endpoints recover the associated
//! grant as often as they like. There are no refresh tokens and no revocation in this
//! server, so the stored grant is immutable once issued.
use std::collections::HashMap;
use std::sync::{MutexGuard, RwLockWriteGuard};

use chrono::{Duration, Utc};

use super::Time;
use super::grant::Grant;
use super::generator::TagGrant;

/// Issuers create bearer tokens.
///
/// It's the issuer's responsibility to ensure that a token can not be guessed and that
/// only one grant is ever associated with it.
pub trait Issuer {
    /// Create a token authorizing the request parameters.
    fn issue(&mut self, grant: Grant) -> Result<IssuedToken, ()>;

    /// Retrieve the parameters associated with an access token.
    fn recover_token(&self, token: &str) -> Result<Option<Grant>, ()>;
}

/// Token parameters returned to a client.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    /// The bearer token.
    pub token: String,

    /// Expiration timestamp, if the expiry extension is in use.
    pub until: Option<Time>,
}

/// Keeps track of access tokens in a simple in-memory hash map.
pub struct TokenMap<G: TagGrant = Box<dyn TagGrant + Send + Sync + 'static>> {
    duration: Option<Duration>,
    generator: G,
    usage: u64,
    access: HashMap<String, Grant>,
}

impl<G: TagGrant> TokenMap<G> {
    /// Construct a `TokenMap` from the given generator.
    pub fn new(generator: G) -> Self {
        Self {
            duration: None,
            generator,
            usage: 0,
            access: HashMap::new(),
        }
    }

    /// Set the validity of all issued grants to the specified duration.
    ///
    /// By default tokens do not expire; a token is valid for exactly as long as its
    /// ledger entry exists.
    pub fn valid_for(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }
}

impl<G: TagGrant> Issuer for TokenMap<G> {
    fn issue(&mut self, mut grant: Grant) -> Result<IssuedToken, ()> {
        if let Some(duration) = self.duration {
            grant.until = Some(Utc::now() + duration);
        }

        let until = grant.until;
        let next_usage = self.usage.wrapping_add(1);

        let token = self.generator.tag(self.usage, &grant)?;
        if self.access.contains_key(&token) {
            return Err(());
        }

        self.access.insert(token.clone(), grant);
        self.usage = next_usage;

        Ok(IssuedToken { token, until })
    }

    fn recover_token(&self, token: &str) -> Result<Option<Grant>, ()> {
        let grant = self.access.get(token);
        match grant {
            Some(grant) => match grant.until {
                Some(until) if until < Utc::now() => Ok(None),
                _ => Ok(Some(grant.clone())),
            },
            None => Ok(None),
        }
    }
}

impl<'a, I: Issuer + ?Sized> Issuer for &'a mut I {
    fn issue(&mut self, grant: Grant) -> Result<IssuedToken, ()> {
        (**self).issue(grant)
    }

    fn recover_token(&self, token: &str) -> Result<Option<Grant>, ()> {
        (**self).recover_token(token)
    }
}

impl<I: Issuer + ?Sized> Issuer for Box<I> {
    fn issue(&mut self, grant: Grant) -> Result<IssuedToken, ()> {
        (**self).issue(grant)
    }

    fn recover_token(&self, token: &str) -> Result<Option<Grant>, ()> {
        (**self).recover_token(token)
    }
}

impl<'a, I: Issuer + ?Sized + 'a> Issuer for MutexGuard<'a, I> {
    fn issue(&mut self, grant: Grant) -> Result<IssuedToken, ()> {
        (**self).issue(grant)
    }

    fn recover_token(&self, token: &str) -> Result<Option<Grant>, ()> {
        (**self).recover_token(token)
    }
}

impl<'a, I: Issuer + ?Sized + 'a> Issuer for RwLockWriteGuard<'a, I> {
    fn issue(&mut self, grant: Grant) -> Result<IssuedToken, ()> {
        (**self).issue(grant)
    }

    fn recover_token(&self, token: &str) -> Result<Option<Grant>, ()> {
        (**self).recover_token(token)
    }
}
