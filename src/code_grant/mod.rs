//! Available backend algorithms.
//!
//! The [`authorization`] module holds the authorization transaction manager driving the
//! authorize endpoint, while [`accesstoken`] and [`client_credentials`] implement the
//! two supported exchanges at the token endpoint. Each flow is a function over two
//! traits: an `Endpoint` supplying the primitives and a `Request` supplying the decoded
//! query or body parameters, so the calling web framework stays interchangeable.
//!
//! [`authorization`]: authorization/index.html
//! [`accesstoken`]: accesstoken/index.html
//! [`client_credentials`]: client_credentials/index.html

pub mod accesstoken;
pub mod authorization;
pub mod client_credentials;
pub mod error;

#[cfg(test)]
mod tests;
