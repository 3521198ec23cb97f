//! # guestlister
//!
//! The core of a minimal OAuth2 authorization server with ORCID-like test identities,
//! as used by the `bouncer`/`guestlister` service pair. It implements exactly two grant
//! types — authorization code and client credentials — against a set of configurable
//! and pluggable back-ends.
//!
//! ## About
//!
//! The crate is designed around traits in both directions: a front-end facing web
//! server drives the flows in [`code_grant`] through small per-flow `Request` traits,
//! while the back-end is assembled from [`primitives`]. These will in general encompass
//! a [`Registrar`] for registered client applications, a [`UserDirectory`] for end
//! users, an [`Authorizer`] holding issued authorization codes and an [`Issuer`]
//! holding access tokens. There is a simple, in-memory implementation provided for each
//! of those, seeded from the plaintext test fixtures in [`config`]. More complex
//! deployments can substitute a persistent backing store by implementing the same
//! traits without any change to the grant engine.
//!
//! ## Trust model
//!
//! End-user login sessions and client application credentials are verified on separate
//! paths: the [`UserDirectory`] decides user logins for the authorize endpoint, the
//! [`Registrar`] authenticates clients for the token endpoint. Neither path reveals
//! whether a presented name existed, only that authentication failed.
//!
//! Issued codes redeem at most once; tokens have no built-in expiry in this design
//! (validation is by ledger lookup), with [`AuthMap::valid_for`] and
//! [`TokenMap::valid_for`] as the opt-in expiry extension.
//!
//! [`code_grant`]: code_grant/index.html
//! [`primitives`]: primitives/index.html
//! [`config`]: config/index.html
//! [`Registrar`]: primitives/registrar/trait.Registrar.html
//! [`UserDirectory`]: primitives/directory/trait.UserDirectory.html
//! [`Authorizer`]: primitives/authorizer/trait.Authorizer.html
//! [`Issuer`]: primitives/issuer/trait.Issuer.html
//! [`AuthMap::valid_for`]: primitives/authorizer/struct.AuthMap.html#method.valid_for
//! [`TokenMap::valid_for`]: primitives/issuer/struct.TokenMap.html#method.valid_for
#![warn(missing_docs)]

pub mod code_grant;
pub mod config;
pub mod primitives;
#[cfg(feature = "debug-sessions")]
pub mod session;
pub mod setup;
