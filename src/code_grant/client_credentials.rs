//! Provides the handling for Client Credentials Requests
//!
//! This is the machine-to-machine path of the token endpoint: no user is involved, the
//! client authenticates with its own secret and receives a token for the one public
//! read scope. The flow shares its response and error types with the code exchange in
//! [`accesstoken`], as both answer on the same endpoint.
//!
//! [`accesstoken`]: ../accesstoken/index.html
use std::borrow::Cow;

use crate::code_grant::error::AccessTokenErrorType;
use crate::primitives::issuer::Issuer;
use crate::primitives::grant::Grant;
use crate::primitives::registrar::{Registrar, RegistrarError};
use crate::primitives::scope::Scope;

use super::accesstoken::{BearerToken, Credentials, Error, PrimitiveError};

/// The only scope a client credentials token is ever issued for.
const PUBLIC_SCOPE: &str = "/read-public";

/// Required content of a client credentials request.
pub trait Request {
    /// Received request might not be encoded correctly. This method gives implementors the chance
    /// to signal that a request was received but its encoding was generally malformed. If this is
    /// the case, then no other attribute will be queried. This method exists mainly to make
    /// frontends straightforward by not having them handle special cases for malformed requests.
    fn valid(&self) -> bool;

    /// User:password of a basic authorization header.
    fn authorization(&self) -> Option<(Cow<str>, Cow<[u8]>)>;

    /// The client_id, as a form parameter in the request body.
    fn client_id(&self) -> Option<Cow<str>>;

    /// The client_secret, as a form parameter in the request body.
    fn client_secret(&self) -> Option<Cow<str>>;

    /// Specifies the requested scope, required on this path.
    fn scope(&self) -> Option<Cow<str>>;

    /// Valid requests have this set to "client_credentials"
    fn grant_type(&self) -> Option<Cow<str>>;

    /// Credentials in body should only be enabled if use of HTTP Basic is not possible.
    ///
    /// Allows the request body to contain the `client_secret` as a form parameter. This is NOT
    /// RECOMMENDED and need not be supported. The parameters MUST NOT appear in the request URI
    /// itself.
    ///
    /// Under these considerations, support must be explicitely enabled.
    fn allow_credentials_in_body(&self) -> bool {
        false
    }
}

/// Required functionality to respond to client credentials requests.
///
/// Each method will only be invoked exactly once when processing a correct and authorized request,
/// and potentially less than once when the request is faulty. These methods should be implemented
/// by internally using `primitives`.
pub trait Endpoint {
    /// Get the client corresponding to some id.
    fn registrar(&self) -> &dyn Registrar;

    /// Return the issuer instance to create the access token.
    fn issuer(&mut self) -> &mut dyn Issuer;
}

type Result<T> = std::result::Result<T, Error>;

/// Try to issue a token on the client's own authority.
pub fn client_credentials(handler: &mut dyn Endpoint, request: &dyn Request) -> Result<BearerToken> {
    if !request.valid() {
        return Err(Error::invalid());
    }

    let authorization = request.authorization();
    let client_id = request.client_id();
    let client_secret = request.client_secret();

    let mut credentials = Credentials::None;
    if let Some((client_id, auth)) = &authorization {
        credentials.authenticate(client_id.as_ref(), auth.as_ref());
    }

    match (&client_id, &client_secret) {
        (Some(client_id), Some(client_secret)) if request.allow_credentials_in_body() => {
            credentials.authenticate(client_id.as_ref(), client_secret.as_ref().as_bytes())
        }
        (None, None) => {}
        (Some(client_id), _) => credentials.unauthenticated(client_id.as_ref()),
        (None, Some(_)) => return Err(Error::invalid()),
    }

    // Only the syntax of the scope is checked here. Whether the request may have it is
    // a policy decision that must not run before the client has authenticated.
    let scope: Option<Scope> = match request.scope() {
        None => None,
        Some(scope) => Some(scope.as_ref().parse().map_err(|_| Error::invalid())?),
    };

    match request.grant_type() {
        Some(ref cow) if cow == "client_credentials" => (),
        None => return Err(Error::invalid()),
        Some(_) => return Err(Error::invalid_with(AccessTokenErrorType::UnsupportedGrantType)),
    };

    let (client_id, auth) = credentials.into_client().ok_or_else(Error::invalid)?;
    // A public client can not use this grant type.
    let auth = auth.ok_or_else(|| Error::unauthorized("basic"))?;

    handler
        .registrar()
        .check(client_id, Some(auth))
        .map_err(|err| match err {
            RegistrarError::Unspecified => Error::unauthorized("basic"),
            RegistrarError::PrimitiveError => Error::Primitive(PrimitiveError { grant: None }),
        })?;

    let client = handler
        .registrar()
        .find_by_identifier(client_id)
        .map_err(|err| match err {
            RegistrarError::Unspecified => Error::unauthorized("basic"),
            RegistrarError::PrimitiveError => Error::Primitive(PrimitiveError { grant: None }),
        })?;

    // Exactly the public read scope must be requested, nothing less and nothing more.
    let scope = scope.ok_or_else(|| Error::invalid_with(AccessTokenErrorType::InvalidScope))?;
    if scope.len() != 1 || !scope.iter().any(|token| token == PUBLIC_SCOPE) {
        return Err(Error::invalid_with(AccessTokenErrorType::InvalidScope));
    }

    let token = handler
        .issuer()
        .issue(Grant {
            // The token belongs to the application itself, under its display name.
            owner_id: client.name,
            client_id: client.identifier,
            redirect_uri: None,
            scope: scope.clone(),
            identity: None,
            until: None,
        })
        .map_err(|()| Error::Primitive(PrimitiveError { grant: None }))?;

    Ok(BearerToken {
        token,
        identity: None,
        scope: Some(scope.to_string()),
    })
}
