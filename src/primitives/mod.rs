//! A collection of primitives useful for more than one grant method.
//!
//! A primitive is the smallest independent unit of policy used in the OAuth related
//! endpoints. For example, an `authorizer` generates and consumes authorization codes.
//! Abstracting away the underlying primitives makes it possible to provide, for
//! example, an independent database based implementation while the grant engine stays
//! unchanged.
//!
//! ```
//! use guestlister::primitives::{
//!     authorizer::AuthMap,
//!     directory::UserMap,
//!     generator::RandomGenerator,
//!     issuer::TokenMap,
//!     registrar::ClientMap,
//! };
//!
//! let registrar = ClientMap::new();
//! let directory = UserMap::new();
//! let authorizer = AuthMap::new(RandomGenerator::new(16));
//! let issuer = TokenMap::new(RandomGenerator::new(32));
//! ```

use chrono::DateTime;
use chrono::Utc;

pub mod authorizer;
pub mod directory;
pub mod generator;
pub mod grant;
pub mod issuer;
pub mod registrar;
pub mod scope;

pub(crate) type Time = DateTime<Utc>;

/// Commonly used primitives for frontends and backends.
pub mod prelude {
    pub use super::authorizer::{Authorizer, AuthMap};
    pub use super::directory::{User, UserDirectory, UserMap, UserRecord};
    pub use super::generator::{TagGrant, RandomGenerator};
    pub use super::issuer::{IssuedToken, Issuer, TokenMap};
    pub use super::registrar::{Client, ClientMap, ClientRecord, Registrar};
    pub use super::scope::Scope;
}
