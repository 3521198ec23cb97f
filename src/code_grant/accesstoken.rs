//! Provides the handling for Access Token Requests
use std::borrow::Cow;
use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::code_grant::error::{AccessTokenError, AccessTokenErrorType};
use crate::primitives::authorizer::Authorizer;
use crate::primitives::issuer::{IssuedToken, Issuer};
use crate::primitives::grant::{Grant, Identity};
use crate::primitives::registrar::{Registrar, RegistrarError};

/// Token Response
#[derive(Deserialize, Serialize)]
pub(crate) struct TokenResponse {
    /// The access token issued by the authorization server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// The type of the token issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// The login name of the user the token was issued on behalf of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// The ORCID-like identity reference of that user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,

    /// The scope, which limits the permissions on the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// The lifetime in seconds of the access token, when expiry is in use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Trait based retrieval of parameters necessary for access token request handling.
pub trait Request {
    /// Received request might not be encoded correctly. This method gives implementors the chance
    /// to signal that a request was received but its encoding was generally malformed. If this is
    /// the case, then no other attribute will be queried. This method exists mainly to make
    /// frontends straightforward by not having them handle special cases for malformed requests.
    fn valid(&self) -> bool;

    /// The authorization code grant for which an access token is wanted.
    fn code(&self) -> Option<Cow<str>>;

    /// User:password of a basic authorization header.
    fn authorization(&self) -> Option<(Cow<str>, Cow<[u8]>)>;

    /// The client_id, as a form parameter in the request body.
    fn client_id(&self) -> Option<Cow<str>>;

    /// The client_secret, as a form parameter in the request body.
    fn client_secret(&self) -> Option<Cow<str>>;

    /// Valid request have the redirect url used to request the authorization code grant.
    fn redirect_uri(&self) -> Option<Cow<str>>;

    /// Valid requests have this set to "authorization_code"
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

/// Required functionality to respond to access token requests.
///
/// Each method will only be invoked exactly once when processing a correct and authorized request,
/// and potentially less than once when the request is faulty. These methods should be implemented
/// by internally using `primitives`.
pub trait Endpoint {
    /// Get the client corresponding to some id.
    fn registrar(&self) -> &dyn Registrar;

    /// Get the authorizer from which we can recover the authorization.
    fn authorizer(&mut self) -> &mut dyn Authorizer;

    /// Return the issuer instance to create the access token.
    fn issuer(&mut self) -> &mut dyn Issuer;
}

pub(crate) enum Credentials<'a> {
    /// No credentials were offered.
    None,
    /// One set of credentials was offered.
    Authenticated {
        client_id: &'a str,
        passphrase: &'a [u8],
    },
    /// No password but name was offered.
    ///
    /// As this server registers confidential clients only, this is an error on any
    /// path where it ends up as the sole credential.
    Unauthenticated { client_id: &'a str },
    /// Multiple possible credentials were offered.
    ///
    /// This is a security issue, only one attempt must be made per request.
    Duplicate,
}

/// Try to redeem an authorization code.
pub fn access_token(handler: &mut dyn Endpoint, request: &dyn Request) -> Result<BearerToken> {
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

    if let Some(client_id) = &client_id {
        match &client_secret {
            Some(auth) if request.allow_credentials_in_body() => {
                credentials.authenticate(client_id.as_ref(), auth.as_ref().as_bytes())
            }
            // Ignore parameter if not allowed.
            Some(_) | None => credentials.unauthenticated(client_id.as_ref()),
        }
    }

    match request.grant_type() {
        Some(ref cow) if cow == "authorization_code" => (),
        None => return Err(Error::invalid()),
        Some(_) => return Err(Error::invalid_with(AccessTokenErrorType::UnsupportedGrantType)),
    };

    let (client_id, auth) = credentials.into_client().ok_or_else(Error::invalid)?;
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

    let code = request.code().ok_or_else(Error::invalid)?;
    let code = code.as_ref();

    // Redeem before any further validation, the code must not survive this request.
    let saved_params = match handler.authorizer().extract(code) {
        Err(()) => return Err(Error::Primitive(PrimitiveError { grant: None })),
        Ok(None) => return Err(Error::invalid_with(AccessTokenErrorType::InvalidGrant)),
        Ok(Some(v)) => v,
    };

    let redirect_uri = request.redirect_uri().ok_or_else(Error::invalid)?;
    let redirect_uri = redirect_uri.as_ref().parse().map_err(|_| Error::invalid())?;

    // The code is bound to the opaque client id, not the public identifier the client
    // authenticated with.
    if saved_params.client_id != client.id || saved_params.redirect_uri != Some(redirect_uri) {
        return Err(Error::invalid_with(AccessTokenErrorType::InvalidGrant));
    }

    if let Some(until) = saved_params.until {
        if until < Utc::now() {
            return Err(Error::invalid_with(AccessTokenErrorType::InvalidGrant));
        }
    }

    let identity = saved_params.identity.clone();

    let token = handler
        .issuer()
        .issue(Grant {
            client_id: saved_params.client_id,
            owner_id: saved_params.owner_id,
            redirect_uri: saved_params.redirect_uri,
            scope: saved_params.scope,
            identity: saved_params.identity,
            until: None,
        })
        .map_err(|()| Error::Primitive(PrimitiveError { grant: None }))?;

    Ok(BearerToken {
        token,
        identity,
        scope: None,
    })
}

impl<'a> Credentials<'a> {
    pub fn authenticate(&mut self, client_id: &'a str, passphrase: &'a [u8]) {
        self.add(Credentials::Authenticated {
            client_id,
            passphrase,
        })
    }

    pub fn unauthenticated(&mut self, client_id: &'a str) {
        self.add(Credentials::Unauthenticated { client_id })
    }

    pub fn into_client(self) -> Option<(&'a str, Option<&'a [u8]>)> {
        match self {
            Credentials::Authenticated {
                client_id,
                passphrase,
            } => Some((client_id, Some(passphrase))),
            Credentials::Unauthenticated { client_id } => Some((client_id, None)),
            _ => None,
        }
    }

    fn add(&mut self, new: Self) {
        *self = match self {
            Credentials::None => new,
            _ => Credentials::Duplicate,
        };
    }
}

/// Defines actions for the response to an access token request.
pub enum Error {
    /// The token did not represent a valid token.
    Invalid(ErrorDescription),

    /// The client did not properly authorize itself.
    Unauthorized(ErrorDescription, String),

    /// An underlying primitive operation did not complete successfully.
    ///
    /// This is expected to occur with some endpoints. See `PrimitiveError` for
    /// more details on when this is returned.
    Primitive(PrimitiveError),
}

/// The endpoint should have enough control over its primitives to find out what has
/// gone wrong, e.g. they may externally supply error information.
pub struct PrimitiveError {
    /// The already extracted grant.
    ///
    /// You may reuse this, or more precisely you must to fulfill this exact request in case of
    /// an error recovery attempt.
    pub grant: Option<Grant>,
}

/// Simple wrapper around AccessTokenError to imbue the type with additional json functionality. In
/// addition this enforces backend specific behaviour for obtaining or handling the access error.
pub struct ErrorDescription {
    pub(crate) error: AccessTokenError,
}

type Result<T> = std::result::Result<T, Error>;

/// Represents an access token and the associated response parameters for serialization.
pub struct BearerToken {
    pub(crate) token: IssuedToken,
    pub(crate) identity: Option<Identity>,
    pub(crate) scope: Option<String>,
}

impl Error {
    pub(crate) fn invalid() -> Self {
        Error::Invalid(ErrorDescription {
            error: AccessTokenError::default(),
        })
    }

    pub(crate) fn invalid_with(with_type: AccessTokenErrorType) -> Self {
        Error::Invalid(ErrorDescription {
            error: {
                let mut error = AccessTokenError::default();
                error.set_type(with_type);
                error
            },
        })
    }

    pub(crate) fn unauthorized(authtype: &str) -> Error {
        Error::Unauthorized(
            ErrorDescription {
                error: {
                    let mut error = AccessTokenError::default();
                    error.set_type(AccessTokenErrorType::InvalidClient);
                    error
                },
            },
            authtype.to_string(),
        )
    }

    /// Get a handle to the description the client will receive.
    ///
    /// Some types of this error don't return any description which is represented by a `None`
    /// result.
    pub fn description(&mut self) -> Option<&mut AccessTokenError> {
        match self {
            Error::Invalid(description) => Some(description.description()),
            Error::Unauthorized(description, _) => Some(description.description()),
            Error::Primitive(_) => None,
        }
    }
}

impl ErrorDescription {
    /// Convert the error into a json string, viable for being sent over a network with
    /// `application/json` encoding.
    pub fn to_json(&self) -> String {
        let asmap = self
            .error
            .iter()
            .map(|(k, v)| (k.to_string(), v.into_owned()))
            .collect::<HashMap<String, String>>();
        serde_json::to_string(&asmap).unwrap()
    }

    /// Get a handle to the description the client will receive.
    pub fn description(&mut self) -> &mut AccessTokenError {
        &mut self.error
    }
}

impl BearerToken {
    /// Convert the token into a json string, viable for being sent over a network with
    /// `application/json` encoding.
    pub fn to_json(&self) -> String {
        let token_response = TokenResponse {
            access_token: Some(self.token.token.clone()),
            token_type: Some("Bearer".to_owned()),
            user: self.identity.as_ref().map(|id| id.username.clone()),
            orcid: self.identity.as_ref().map(|id| id.orcid.clone()),
            scope: self.scope.clone(),
            expires_in: self
                .token
                .until
                .map(|until| until.signed_duration_since(Utc::now()).num_seconds()),
            error: None,
        };

        serde_json::to_string(&token_response).unwrap()
    }
}
