//! Directories administer the database of end users known to the identity provider.
//!
//! The directory is the counterpart of the registrar for human principals. It resolves
//! usernames during login and internal ids during code issuance, and it is the only
//! component that ever sees a user's password. The same argon2 password policy used for
//! client secrets protects stored passwords.
use std::collections::HashMap;
use std::sync::{MutexGuard, RwLockWriteGuard};

use chrono::Utc;

use super::Time;
use super::registrar::{Argon2, PasswordPolicy};

/// A user directory backing the login step of the authorize endpoint.
pub trait UserDirectory {
    /// Resolve a user by the opaque internal id stored in sessions and grants.
    fn find_by_id(&self, id: &str) -> Result<UserRecord, DirectoryError>;

    /// Resolve a user by login name.
    fn find_by_username(&self, username: &str) -> Result<UserRecord, DirectoryError>;

    /// Verify a username and password pair, returning the principal on success.
    ///
    /// A successful login updates the user's last-seen timestamp. An unknown name and a
    /// wrong password fail identically.
    fn login(&mut self, username: &str, password: &[u8]) -> Result<UserRecord, DirectoryError>;
}

/// Handled responses from a user directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryError {
    /// The user does not exist or the password did not match.
    ///
    /// Deliberately one variant for both causes so that login failures do not
    /// enumerate registered names.
    Unspecified,

    /// Something went wrong with this primitive that has no security reason.
    PrimitiveError,
}

/// A user as supplied for seeding, before the password is encoded.
#[derive(Clone, Debug)]
pub struct User {
    /// Opaque internal id.
    pub id: String,

    /// Login name.
    pub username: String,

    /// Plaintext password, consumed during registration.
    pub password: String,

    /// Human readable display name.
    pub name: String,

    /// The ORCID-like external identity reference.
    pub orcid: String,

    /// Authorization level of the user (admin 1000, editor 500, known 100).
    pub level: u32,
}

/// The public attributes of a registered user, as returned from lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    /// Opaque internal id.
    pub id: String,

    /// Login name.
    pub username: String,

    /// Human readable display name.
    pub name: String,

    /// The ORCID-like external identity reference.
    pub orcid: String,

    /// Authorization level of the user.
    pub level: u32,

    /// When this user last logged in, stamped at seed time and on every login.
    pub last_seen: Time,
}

struct EncodedUser {
    record: UserRecord,
    passdata: Vec<u8>,
}

/// A simple in-memory user directory keyed by username.
pub struct UserMap {
    users: HashMap<String, EncodedUser>,
    password_policy: Box<dyn PasswordPolicy>,
}

impl Default for UserMap {
    fn default() -> Self {
        UserMap {
            users: HashMap::new(),
            password_policy: Box::new(Argon2::default()),
        }
    }
}

impl UserMap {
    /// Create an empty directory without any users in it.
    pub fn new() -> UserMap {
        UserMap::default()
    }

    /// Insert or update the user record, stamping `last_seen` now.
    pub fn register_user(&mut self, user: User) {
        let passdata = self.password_policy.store(&user.username, user.password.as_bytes());
        let encoded = EncodedUser {
            record: UserRecord {
                id: user.id,
                username: user.username,
                name: user.name,
                orcid: user.orcid,
                level: user.level,
                last_seen: Utc::now(),
            },
            passdata,
        };
        self.users.insert(encoded.record.username.clone(), encoded);
    }

    /// Change how passwords are encoded while stored.
    pub fn set_password_policy<P: PasswordPolicy + 'static>(&mut self, new_policy: P) {
        self.password_policy = Box::new(new_policy)
    }
}

impl Extend<User> for UserMap {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = User>,
    {
        iter.into_iter().for_each(|user| self.register_user(user))
    }
}

impl UserDirectory for UserMap {
    fn find_by_id(&self, id: &str) -> Result<UserRecord, DirectoryError> {
        self.users
            .values()
            .find(|user| user.record.id == id)
            .map(|user| user.record.clone())
            .ok_or(DirectoryError::Unspecified)
    }

    fn find_by_username(&self, username: &str) -> Result<UserRecord, DirectoryError> {
        self.users
            .get(username)
            .map(|user| user.record.clone())
            .ok_or(DirectoryError::Unspecified)
    }

    fn login(&mut self, username: &str, password: &[u8]) -> Result<UserRecord, DirectoryError> {
        let user = self
            .users
            .get_mut(username)
            .ok_or(DirectoryError::Unspecified)?;

        self.password_policy
            .check(username, password, &user.passdata)
            .map_err(|_| DirectoryError::Unspecified)?;

        user.record.last_seen = Utc::now();
        Ok(user.record.clone())
    }
}

impl<'s, D: UserDirectory + ?Sized + 's> UserDirectory for &'s mut D {
    fn find_by_id(&self, id: &str) -> Result<UserRecord, DirectoryError> {
        (**self).find_by_id(id)
    }

    fn find_by_username(&self, username: &str) -> Result<UserRecord, DirectoryError> {
        (**self).find_by_username(username)
    }

    fn login(&mut self, username: &str, password: &[u8]) -> Result<UserRecord, DirectoryError> {
        (**self).login(username, password)
    }
}

impl<D: UserDirectory + ?Sized> UserDirectory for Box<D> {
    fn find_by_id(&self, id: &str) -> Result<UserRecord, DirectoryError> {
        (**self).find_by_id(id)
    }

    fn find_by_username(&self, username: &str) -> Result<UserRecord, DirectoryError> {
        (**self).find_by_username(username)
    }

    fn login(&mut self, username: &str, password: &[u8]) -> Result<UserRecord, DirectoryError> {
        (**self).login(username, password)
    }
}

impl<'s, D: UserDirectory + ?Sized + 's> UserDirectory for MutexGuard<'s, D> {
    fn find_by_id(&self, id: &str) -> Result<UserRecord, DirectoryError> {
        (**self).find_by_id(id)
    }

    fn find_by_username(&self, username: &str) -> Result<UserRecord, DirectoryError> {
        (**self).find_by_username(username)
    }

    fn login(&mut self, username: &str, password: &[u8]) -> Result<UserRecord, DirectoryError> {
        (**self).login(username, password)
    }
}

impl<'s, D: UserDirectory + ?Sized + 's> UserDirectory for RwLockWriteGuard<'s, D> {
    fn find_by_id(&self, id: &str) -> Result<UserRecord, DirectoryError> {
        (**self).find_by_id(id)
    }

    fn find_by_username(&self, username: &str) -> Result<UserRecord, DirectoryError> {
        (**self).find_by_username(username)
    }

    fn login(&mut self, username: &str, password: &[u8]) -> Result<UserRecord, DirectoryError> {
        (**self).login(username, password)
    }
}
