//! Registrars administer a database of known client applications.
//!
//! It is the registrar's duty to resolve the public client identifier presented in a
//! request to the registered application and to verify the client secret when the
//! token endpoint is called. Lookups by the opaque internal id serve the session layer
//! which stores only that id between requests.
use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, RwLockWriteGuard};
use std::rc::Rc;

use argon2::{self, Config};
use once_cell::sync::Lazy;
use rand::{thread_rng, RngCore};

/// Registrars provide a way to interact with registered client applications.
///
/// Most importantly, they determine whether a presented client identifier names a
/// registered application and whether the accompanying secret is valid. In general,
/// implementations of this trait will probably offer an interface for registering new
/// clients. This interface is not covered by this library; the in-memory `ClientMap`
/// is seeded from test fixtures only.
pub trait Registrar {
    /// Resolve a client by its opaque internal id.
    fn find_by_id(&self, id: &str) -> Result<ClientRecord, RegistrarError>;

    /// Resolve a client by the public client identifier presented in requests.
    fn find_by_identifier(&self, identifier: &str) -> Result<ClientRecord, RegistrarError>;

    /// Try to login as client with some authentication.
    ///
    /// A missing passphrase fails like a wrong one; this server registers confidential
    /// clients only.
    fn check(&self, identifier: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError>;
}

/// Handled responses from a registrar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrarError {
    /// One of several different causes that should be indistinguishable.
    ///
    /// * Indicates an entirely unknown client.
    /// * The client is not authorized.
    ///
    /// These should be indistinguishable to avoid client enumeration.
    Unspecified,

    /// Something went wrong with this primitive that has no security reason.
    PrimitiveError,
}

/// A client application as supplied for registration, before its secret is encoded.
#[derive(Clone, Debug)]
pub struct Client {
    /// Opaque internal id, the key every grant record refers to.
    pub id: String,

    /// Human readable display name, also the token owner for client credentials grants.
    pub name: String,

    /// The public client identifier presented in authorization requests.
    pub identifier: String,

    /// The confidential client secret.
    pub secret: String,

    /// Whether the consent step may be skipped for this client.
    pub trusted: bool,
}

/// A client whose credentials have been wrapped by a password policy.
///
/// This is the storage form; the plaintext secret does not survive registration.
#[derive(Clone, Debug)]
pub struct EncodedClient {
    record: ClientRecord,
    passdata: Vec<u8>,
}

/// The public attributes of a registered client, as returned from lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientRecord {
    /// Opaque internal id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Public client identifier.
    pub identifier: String,

    /// Whether the consent step may be skipped for this client.
    pub trusted: bool,
}

/// Determines how passphrases are stored and checked.
///
/// The provided library implementation is based on `Argon2`.
pub trait PasswordPolicy: Send + Sync {
    /// Transform the passphrase so it can be stored in the confidential client.
    fn store(&self, client_id: &str, passphrase: &[u8]) -> Vec<u8>;

    /// Check if the stored data corresponds to that of the client id and passphrase.
    fn check(&self, client_id: &str, passphrase: &[u8], stored: &[u8]) -> Result<(), RegistrarError>;
}

/// Store passwords using `Argon2` to derive the stored value.
#[derive(Clone, Debug, Default)]
pub struct Argon2 {}

impl PasswordPolicy for Argon2 {
    fn store(&self, client_id: &str, passphrase: &[u8]) -> Vec<u8> {
        let mut config = Config::default();
        config.ad = client_id.as_bytes();
        config.secret = &[];

        let mut salt = vec![0; 32];
        thread_rng()
            .try_fill_bytes(salt.as_mut_slice())
            .expect("Failed to generate password salt");

        let encoded = argon2::hash_encoded(passphrase, &salt, &config);
        encoded.unwrap().as_bytes().to_vec()
    }

    fn check(&self, client_id: &str, passphrase: &[u8], stored: &[u8]) -> Result<(), RegistrarError> {
        let hash = String::from_utf8(stored.to_vec());
        let valid = match hash {
            Ok(hash) => argon2::verify_encoded_ext(&hash, passphrase, &[], client_id.as_bytes())
                .map_err(|_| RegistrarError::Unspecified),
            _ => Err(RegistrarError::Unspecified),
        };

        match valid {
            Ok(true) => Ok(()),
            _ => Err(RegistrarError::Unspecified),
        }
    }
}

static DEFAULT_PASSWORD_POLICY: Lazy<Argon2> = Lazy::new(Argon2::default);

/// A very simple, in-memory hash map of client identifiers to client entries.
#[derive(Default)]
pub struct ClientMap {
    clients: HashMap<String, EncodedClient>,
    password_policy: Option<Box<dyn PasswordPolicy>>,
}

impl Client {
    fn encode(self, policy: &dyn PasswordPolicy) -> EncodedClient {
        let passdata = policy.store(&self.identifier, self.secret.as_bytes());
        EncodedClient {
            record: ClientRecord {
                id: self.id,
                name: self.name,
                identifier: self.identifier,
                trusted: self.trusted,
            },
            passdata,
        }
    }
}

impl ClientMap {
    /// Create an empty map without any clients in it.
    pub fn new() -> ClientMap {
        ClientMap::default()
    }

    /// Insert or update the client record.
    pub fn register_client(&mut self, client: Client) {
        let password_policy = Self::current_policy(&self.password_policy);
        let encoded = client.encode(password_policy);
        self.clients
            .insert(encoded.record.identifier.clone(), encoded);
    }

    /// Change how passwords are encoded while stored.
    pub fn set_password_policy<P: PasswordPolicy + 'static>(&mut self, new_policy: P) {
        self.password_policy = Some(Box::new(new_policy))
    }

    // This is not an instance method because it needs to borrow the box but register needs &mut
    fn current_policy(policy: &Option<Box<dyn PasswordPolicy>>) -> &dyn PasswordPolicy {
        policy
            .as_ref()
            .map(|boxed| &**boxed)
            .unwrap_or(&*DEFAULT_PASSWORD_POLICY)
    }
}

impl Extend<Client> for ClientMap {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = Client>,
    {
        iter.into_iter().for_each(|client| self.register_client(client))
    }
}

impl std::iter::FromIterator<Client> for ClientMap {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Client>,
    {
        let mut into = ClientMap::new();
        into.extend(iter);
        into
    }
}

impl Registrar for ClientMap {
    fn find_by_id(&self, id: &str) -> Result<ClientRecord, RegistrarError> {
        // The map is keyed by identifier; the handful of fixture clients makes a scan
        // over the values cheaper than a second index.
        self.clients
            .values()
            .find(|client| client.record.id == id)
            .map(|client| client.record.clone())
            .ok_or(RegistrarError::Unspecified)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<ClientRecord, RegistrarError> {
        self.clients
            .get(identifier)
            .map(|client| client.record.clone())
            .ok_or(RegistrarError::Unspecified)
    }

    fn check(&self, identifier: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        let password_policy = Self::current_policy(&self.password_policy);

        let client = self
            .clients
            .get(identifier)
            .ok_or(RegistrarError::Unspecified)?;

        match passphrase {
            Some(provided) => password_policy.check(identifier, provided, &client.passdata),
            None => Err(RegistrarError::Unspecified),
        }
    }
}

impl<'s, R: Registrar + ?Sized> Registrar for &'s R {
    fn find_by_id(&self, id: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_id(id)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_identifier(identifier)
    }

    fn check(&self, identifier: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(identifier, passphrase)
    }
}

impl<R: Registrar + ?Sized> Registrar for Box<R> {
    fn find_by_id(&self, id: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_id(id)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_identifier(identifier)
    }

    fn check(&self, identifier: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(identifier, passphrase)
    }
}

impl<R: Registrar + ?Sized> Registrar for Rc<R> {
    fn find_by_id(&self, id: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_id(id)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_identifier(identifier)
    }

    fn check(&self, identifier: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(identifier, passphrase)
    }
}

impl<R: Registrar + ?Sized> Registrar for Arc<R> {
    fn find_by_id(&self, id: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_id(id)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_identifier(identifier)
    }

    fn check(&self, identifier: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(identifier, passphrase)
    }
}

impl<'s, R: Registrar + ?Sized + 's> Registrar for MutexGuard<'s, R> {
    fn find_by_id(&self, id: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_id(id)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_identifier(identifier)
    }

    fn check(&self, identifier: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(identifier, passphrase)
    }
}

impl<'s, R: Registrar + ?Sized + 's> Registrar for RwLockWriteGuard<'s, R> {
    fn find_by_id(&self, id: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_id(id)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<ClientRecord, RegistrarError> {
        (**self).find_by_identifier(identifier)
    }

    fn check(&self, identifier: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(identifier, passphrase)
    }
}
