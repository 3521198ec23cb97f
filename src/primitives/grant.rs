//! Encapsulates the data shared between authorization codes and access tokens.
use super::Time;
use super::scope::Scope;

use url::Url;

/// The ORCID-like identity attached to a grant issued on behalf of an end user.
///
/// Carried from the authorization code into the token response so that the relying
/// service can learn who logged in without a separate user-info round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Login name of the user who approved the request.
    pub username: String,

    /// The external identity reference, an ORCID-like string.
    pub orcid: String,
}

/// Owning copy of a grant.
///
/// This can be stored in a database without worrying about lifetimes or shared across
/// thread boundaries. The same representation backs both ledger halves: an authorization
/// code record always carries a `redirect_uri` and an `identity`, an access token record
/// issued through the client credentials exchange carries neither.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    /// Identifies the granting principal: the user id, or the client's display name for
    /// client credentials grants.
    pub owner_id: String,

    /// Identifies the client to which the grant was issued.
    pub client_id: String,

    /// The scope granted to the client.
    pub scope: Scope,

    /// The redirection uri the code was issued under. Must match exactly on redemption.
    pub redirect_uri: Option<Url>,

    /// The end-user identity bound to this grant, if it originated from a login.
    pub identity: Option<Identity>,

    /// Expiration date of the grant (Utc), when the expiry extension is in use.
    ///
    /// `None` means the grant does not expire; validation is by ledger lookup alone.
    pub until: Option<Time>,
}
