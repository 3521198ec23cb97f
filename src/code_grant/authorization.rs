//! Provides the handling for Authorization Code Requests.
//!
//! A request to the authorize endpoint opens an authorization transaction: the client
//! is resolved through the registrar, the redirect target and scope are validated, and
//! the authenticated user is attached. The transaction then awaits a decision. The
//! shipped policy approves every transaction immediately, but the [`Pending`] handle
//! and the [`TransactionMap`] keep the consent step available to front-ends that want
//! to render a decision view between the two requests.
//!
//! [`Pending`]: struct.Pending.html
//! [`TransactionMap`]: struct.TransactionMap.html
use std::borrow::Cow;
use std::collections::HashMap;
use std::result::Result as StdResult;

use chrono::{Duration, Utc};
use url::Url;

use crate::code_grant::error::{AuthorizationError, AuthorizationErrorType};
use crate::primitives::Time;
use crate::primitives::authorizer::Authorizer;
use crate::primitives::generator::RandomGenerator;
use crate::primitives::grant::{Grant, Identity};
use crate::primitives::directory::UserRecord;
use crate::primitives::registrar::{ClientRecord, Registrar, RegistrarError};
use crate::primitives::scope::Scope;

/// Interface required from a request to determine the handling in the backend.
pub trait Request {
    /// Received request might not be encoded correctly. This method gives implementors the chance
    /// to signal that a request was received but its encoding was generally malformed. If this is
    /// the case, then no other attribute will be queried. This method exists mainly to make
    /// frontends straightforward by not having them handle special cases for malformed requests.
    fn valid(&self) -> bool;

    /// Identity of the client trying to gain an oauth token.
    fn client_id(&self) -> Option<Cow<str>>;

    /// Optionally specifies the requested scope
    fn scope(&self) -> Option<Cow<str>>;

    /// The url the user agent is redirected to after the decision, with the code attached.
    fn redirect_uri(&self) -> Option<Cow<str>>;

    /// Optional parameter the client can use to identify the redirected user-agent.
    fn state(&self) -> Option<Cow<str>>;

    /// The method requested, valid requests MUST return `code`
    fn response_type(&self) -> Option<Cow<str>>;
}

/// Required functionality to respond to authorization code requests.
///
/// Each method will only be invoked exactly once when processing a correct and authorized request,
/// and potentially less than once when the request is faulty. These methods should be implemented
/// by internally using `primitives`.
pub trait Endpoint {
    /// Resolve the client named in a request to its registered record.
    fn registrar(&self) -> &dyn Registrar;

    /// Generate an authorization code for a given grant.
    fn authorizer(&mut self) -> &mut dyn Authorizer;
}

/// Validate an authorization request and open a transaction for it.
///
/// The authenticated user must be supplied by the caller; an anonymous user agent is
/// redirected to login by the front-end before this function is ever reached. If the
/// named client is not registered the request is ignored entirely, since without a
/// trusted redirect target no error can safely be delivered anywhere. Errors after the
/// client resolved are delivered to its redirect url.
pub fn authorization_code(
    handler: &mut dyn Endpoint, request: &dyn Request, user: UserRecord,
) -> self::Result<Pending> {
    if !request.valid() {
        return Err(Error::Ignore);
    }

    let client_id = request.client_id().ok_or(Error::Ignore)?;
    let redirect_uri = request.redirect_uri().ok_or(Error::Ignore)?;
    let redirect_uri: Url = redirect_uri.as_ref().parse().map_err(|_| Error::Ignore)?;

    let client = match handler.registrar().find_by_identifier(client_id.as_ref()) {
        Err(RegistrarError::Unspecified) => return Err(Error::Ignore),
        Err(RegistrarError::PrimitiveError) => return Err(Error::PrimitiveError),
        Ok(client) => client,
    };

    let state = request.state().map(|state| state.into_owned());

    match request.response_type() {
        Some(ref method) if method.as_ref() == "code" => (),
        _ => {
            let prepared_error = ErrorUrl::with_request(
                request,
                redirect_uri,
                AuthorizationErrorType::UnsupportedResponseType,
            );
            return Err(Error::Redirect(prepared_error));
        }
    }

    // The granted scope is fixed on this path; a requested scope is only checked for
    // well-formedness and otherwise ignored.
    if let Some(scope) = request.scope() {
        if scope.as_ref().parse::<Scope>().is_err() {
            let prepared_error = ErrorUrl::with_request(
                request,
                redirect_uri,
                AuthorizationErrorType::InvalidScope,
            );
            return Err(Error::Redirect(prepared_error));
        }
    }
    let scope: Scope = Transaction::GRANTED_SCOPE
        .parse()
        .map_err(|_| Error::PrimitiveError)?;

    Ok(Pending {
        transaction: Transaction {
            client,
            user,
            redirect_uri,
            scope,
            state,
            until: None,
        },
    })
}

/// A valid authorization request awaiting the owner's decision.
///
/// The attached user authenticated beforehand; what remains open is only whether the
/// client may act on their behalf. The shipped policy calls [`authorize`] right away.
///
/// [`authorize`]: #method.authorize
// Don't ever implement `Clone` here. It's to make it very hard for the user to
// accidentally respond to a request in two conflicting ways. This has potential
// security impact if it could be both denied and authorized.
pub struct Pending {
    transaction: Transaction,
}

/// The data of an open authorization transaction.
///
/// Lives either inline in a [`Pending`] or parked in a [`TransactionMap`] between the
/// authorize request and the decision request. Never stored in the grant ledger.
///
/// [`Pending`]: struct.Pending.html
/// [`TransactionMap`]: struct.TransactionMap.html
#[derive(Clone, Debug)]
struct Transaction {
    client: ClientRecord,
    user: UserRecord,
    redirect_uri: Url,
    scope: Scope,
    state: Option<String>,
    until: Option<Time>,
}

impl Transaction {
    /// Every code issued here authorizes exactly the login exchange.
    const GRANTED_SCOPE: &'static str = "/authenticate";
}

/// A view of a pending transaction suitable for rendering a consent page.
#[derive(Clone, Debug)]
pub struct Solicitation<'a> {
    /// The client asking for authorization.
    pub client: &'a ClientRecord,

    /// The user whose authorization is asked for.
    pub user: &'a UserRecord,

    /// The scope that will be granted on approval.
    pub scope: &'a Scope,
}

impl Pending {
    /// Reference this pending state as a solicitation.
    pub fn as_solicitation(&self) -> Solicitation<'_> {
        Solicitation {
            client: &self.transaction.client,
            user: &self.transaction.user,
            scope: &self.transaction.scope,
        }
    }

    /// Whether the decision step may be skipped for this client.
    pub fn auto_approvable(&self) -> bool {
        self.transaction.client.trusted
    }

    /// Denies the request, which redirects to the client for which the request originated.
    pub fn deny(self) -> Result<Url> {
        let url = self.transaction.redirect_uri;
        let mut error = AuthorizationError::default();
        error.set_type(AuthorizationErrorType::AccessDenied);
        let error = ErrorUrl::new(url, self.transaction.state.as_deref(), error);
        Err(Error::Redirect(error))
    }

    /// Approve the transaction and issue the authorization code.
    ///
    /// The code grant is bound to the client's opaque id, the exact redirect url of the
    /// request and the identity of the attached user. The returned url is the redirect
    /// target with the `code` query parameter appended.
    pub fn authorize(self, handler: &mut dyn Endpoint) -> Result<Url> {
        let mut url = self.transaction.redirect_uri.clone();

        let code = handler
            .authorizer()
            .authorize(Grant {
                owner_id: self.transaction.user.id,
                client_id: self.transaction.client.id,
                redirect_uri: Some(self.transaction.redirect_uri),
                scope: self.transaction.scope,
                identity: Some(Identity {
                    username: self.transaction.user.username,
                    orcid: self.transaction.user.orcid,
                }),
                until: None,
            })
            .map_err(|()| Error::PrimitiveError)?;

        url.query_pairs_mut()
            .append_pair("code", code.as_str())
            .extend_pairs(self.transaction.state.map(|v| ("state", v)))
            .finish();
        Ok(url)
    }
}

/// Parks pending transactions between the authorize request and the decision request.
///
/// Keys are fresh random identifiers, suitable for embedding in the decision form.
/// Retrieval consumes the entry, so a transaction is decided at most once even when the
/// decision request is replayed.
pub struct TransactionMap {
    generator: RandomGenerator,
    validity: Option<Duration>,
    pending: HashMap<String, Transaction>,
}

impl TransactionMap {
    /// Create an empty map generating ids with the given generator.
    pub fn new(generator: RandomGenerator) -> Self {
        TransactionMap {
            generator,
            validity: None,
            pending: HashMap::new(),
        }
    }

    /// Have parked transactions expire after `duration`.
    ///
    /// An expired transaction behaves exactly like an unknown id on resumption.
    pub fn valid_for(&mut self, duration: Duration) {
        self.validity = Some(duration);
    }

    /// Park a pending transaction, returning the id for the decision round trip.
    pub fn defer(&mut self, pending: Pending) -> String {
        let id = self.generator.generate();
        let mut transaction = pending.transaction;
        if let Some(validity) = self.validity {
            transaction.until = Some(Utc::now() + validity);
        }
        self.pending.insert(id.clone(), transaction);
        id
    }

    /// Take up a parked transaction again, consuming it.
    pub fn resume(&mut self, id: &str) -> Option<Pending> {
        let transaction = self.pending.remove(id)?;
        match transaction.until {
            Some(until) if until < Utc::now() => None,
            _ => Some(Pending { transaction }),
        }
    }
}

/// Defines the correct treatment of the error.
///
/// Not all errors are signalled to the requesting party, especially when impersonation is possible
/// it is integral for security to resolve the error internally instead of redirecting the user
/// agent to a possibly crafted and malicious target.
#[derive(Clone)]
pub enum Error {
    /// Ignore the request entirely
    Ignore,

    /// Redirect to the given url
    Redirect(ErrorUrl),

    /// Something happened in one of the primitives.
    ///
    /// The endpoint should decide how to handle this and if this is temporary.
    PrimitiveError,
}

/// Encapsulates a redirect to a valid redirect_uri with an error response. The implementation
/// makes it possible to alter the contained error, for example to provide additional optional
/// information. The error type should not be altered by the frontend but the specificalities
/// of this should be enforced by the frontend instead.
#[derive(Clone)]
pub struct ErrorUrl {
    base_uri: Url,
    error: AuthorizationError,
}

type Result<T> = StdResult<T, Error>;

impl ErrorUrl {
    /// Construct a new error, already fixing the state parameter if it exists.
    pub fn new(mut url: Url, state: Option<&str>, error: AuthorizationError) -> ErrorUrl {
        url.query_pairs_mut()
            .extend_pairs(state.map(|st| ("state", st)));
        ErrorUrl { base_uri: url, error }
    }

    /// Construct a new error with a request to provide `state` and an error type
    pub fn with_request(
        request: &dyn Request, redirect_uri: Url, err_type: AuthorizationErrorType,
    ) -> ErrorUrl {
        let mut err = ErrorUrl::new(
            redirect_uri,
            request.state().as_deref(),
            AuthorizationError::default(),
        );
        err.description().set_type(err_type);
        err
    }

    /// Get a handle to the description the client will receive.
    pub fn description(&mut self) -> &mut AuthorizationError {
        &mut self.error
    }
}

impl Error {
    /// Get a handle to the description the client will receive.
    ///
    /// Some types of this error don't return any description which is represented by a `None`
    /// result.
    pub fn description(&mut self) -> Option<&mut AuthorizationError> {
        match self {
            Error::Ignore => None,
            Error::Redirect(inner) => Some(inner.description()),
            Error::PrimitiveError => None,
        }
    }
}

impl From<ErrorUrl> for Url {
    /// Finalize the error url by saving its parameters in the query part of the redirect_uri
    fn from(error: ErrorUrl) -> Url {
        let mut url = error.base_uri;
        url.query_pairs_mut().extend_pairs(error.error.into_iter());
        url
    }
}
