//! In-memory harness driving the grant flows with crafted requests.
use std::borrow::Cow;
use std::collections::HashMap;

use chrono::Duration;
use url::Url;

use crate::primitives::authorizer::{AuthMap, Authorizer};
use crate::primitives::directory::{UserDirectory, UserMap, UserRecord};
use crate::primitives::generator::RandomGenerator;
use crate::primitives::issuer::{Issuer, TokenMap};
use crate::primitives::registrar::{Client, ClientMap, Registrar};

use super::accesstoken::{self, access_token};
use super::authorization::{self, authorization_code, TransactionMap};
use super::client_credentials::{self, client_credentials};
use super::error::{AccessTokenErrorType, AuthorizationErrorType};

const EXAMPLE_CLIENT_ID: &str = "APP-8XINMK52KZVU";
const EXAMPLE_CLIENT_SECRET: &str = "2afa48e4-9473-446f-88bd";
const EXAMPLE_REDIRECT_URI: &str = "http://localhost:8080/api/v1/auth/login";

struct TestEndpoint {
    registrar: ClientMap,
    authorizer: AuthMap<RandomGenerator>,
    issuer: TokenMap<RandomGenerator>,
}

impl TestEndpoint {
    fn new() -> Self {
        let mut registrar = ClientMap::new();
        registrar.register_client(Client {
            id: "3".to_string(),
            name: "o2rtest".to_string(),
            identifier: EXAMPLE_CLIENT_ID.to_string(),
            secret: EXAMPLE_CLIENT_SECRET.to_string(),
            trusted: true,
        });

        TestEndpoint {
            registrar,
            authorizer: AuthMap::new(RandomGenerator::new(16)),
            issuer: TokenMap::new(RandomGenerator::new(32)),
        }
    }

    fn with_second_client(mut self) -> Self {
        self.registrar.register_client(Client {
            id: "4".to_string(),
            name: "other".to_string(),
            identifier: "APP-OTHER".to_string(),
            secret: "other-secret".to_string(),
            trusted: false,
        });
        self
    }
}

impl authorization::Endpoint for TestEndpoint {
    fn registrar(&self) -> &dyn Registrar {
        &self.registrar
    }

    fn authorizer(&mut self) -> &mut dyn Authorizer {
        &mut self.authorizer
    }
}

impl accesstoken::Endpoint for TestEndpoint {
    fn registrar(&self) -> &dyn Registrar {
        &self.registrar
    }

    fn authorizer(&mut self) -> &mut dyn Authorizer {
        &mut self.authorizer
    }

    fn issuer(&mut self) -> &mut dyn Issuer {
        &mut self.issuer
    }
}

impl client_credentials::Endpoint for TestEndpoint {
    fn registrar(&self) -> &dyn Registrar {
        &self.registrar
    }

    fn issuer(&mut self) -> &mut dyn Issuer {
        &mut self.issuer
    }
}

#[derive(Default)]
struct CraftedRequest {
    valid: bool,
    params: HashMap<&'static str, String>,
    authorization: Option<(String, Vec<u8>)>,
    allow_credentials_in_body: bool,
}

impl CraftedRequest {
    fn new(params: &[(&'static str, &str)]) -> Self {
        CraftedRequest {
            valid: true,
            params: params
                .iter()
                .map(|&(key, value)| (key, value.to_string()))
                .collect(),
            authorization: None,
            allow_credentials_in_body: false,
        }
    }

    fn with_basic_auth(mut self, client_id: &str, secret: &str) -> Self {
        self.authorization = Some((client_id.to_string(), secret.as_bytes().to_vec()));
        self
    }

    fn param(&self, key: &str) -> Option<Cow<str>> {
        self.params.get(key).map(|value| Cow::Borrowed(value.as_str()))
    }
}

impl authorization::Request for CraftedRequest {
    fn valid(&self) -> bool {
        self.valid
    }

    fn client_id(&self) -> Option<Cow<str>> {
        self.param("client_id")
    }

    fn scope(&self) -> Option<Cow<str>> {
        self.param("scope")
    }

    fn redirect_uri(&self) -> Option<Cow<str>> {
        self.param("redirect_uri")
    }

    fn state(&self) -> Option<Cow<str>> {
        self.param("state")
    }

    fn response_type(&self) -> Option<Cow<str>> {
        self.param("response_type")
    }
}

impl accesstoken::Request for CraftedRequest {
    fn valid(&self) -> bool {
        self.valid
    }

    fn code(&self) -> Option<Cow<str>> {
        self.param("code")
    }

    fn authorization(&self) -> Option<(Cow<str>, Cow<[u8]>)> {
        self.authorization
            .as_ref()
            .map(|(id, secret)| (Cow::Borrowed(id.as_str()), Cow::Borrowed(secret.as_slice())))
    }

    fn client_id(&self) -> Option<Cow<str>> {
        self.param("client_id")
    }

    fn client_secret(&self) -> Option<Cow<str>> {
        self.param("client_secret")
    }

    fn redirect_uri(&self) -> Option<Cow<str>> {
        self.param("redirect_uri")
    }

    fn grant_type(&self) -> Option<Cow<str>> {
        self.param("grant_type")
    }

    fn allow_credentials_in_body(&self) -> bool {
        self.allow_credentials_in_body
    }
}

impl client_credentials::Request for CraftedRequest {
    fn valid(&self) -> bool {
        self.valid
    }

    fn authorization(&self) -> Option<(Cow<str>, Cow<[u8]>)> {
        self.authorization
            .as_ref()
            .map(|(id, secret)| (Cow::Borrowed(id.as_str()), Cow::Borrowed(secret.as_slice())))
    }

    fn client_id(&self) -> Option<Cow<str>> {
        self.param("client_id")
    }

    fn client_secret(&self) -> Option<Cow<str>> {
        self.param("client_secret")
    }

    fn scope(&self) -> Option<Cow<str>> {
        self.param("scope")
    }

    fn grant_type(&self) -> Option<Cow<str>> {
        self.param("grant_type")
    }

    fn allow_credentials_in_body(&self) -> bool {
        self.allow_credentials_in_body
    }
}

fn test_user() -> UserRecord {
    let mut directory = UserMap::new();
    directory.extend(
        crate::config::Fixtures::builtin()
            .users
            .into_iter()
            .map(Into::into),
    );
    directory
        .login("o2r-author", b"secretauthor1")
        .expect("Fixture user can log in")
}

fn authorize_request() -> CraftedRequest {
    CraftedRequest::new(&[
        ("client_id", EXAMPLE_CLIENT_ID),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
        ("response_type", "code"),
    ])
}

/// Run the authorize step with auto-approval and return the issued code.
fn issue_code(endpoint: &mut TestEndpoint) -> String {
    let pending = authorization_code(endpoint, &authorize_request(), test_user())
        .unwrap_or_else(|_| panic!("Authorization request was not accepted"));
    assert!(pending.auto_approvable());

    let url = match pending.authorize(endpoint) {
        Ok(url) => url,
        Err(_) => panic!("Auto approval failed"),
    };

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .expect("Redirect misses code parameter")
}

fn exchange_request(code: &str) -> CraftedRequest {
    CraftedRequest::new(&[
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
    ])
    .with_basic_auth(EXAMPLE_CLIENT_ID, EXAMPLE_CLIENT_SECRET)
}

fn access_token_error(
    result: Result<accesstoken::BearerToken, accesstoken::Error>,
) -> AccessTokenErrorType {
    match result {
        Ok(_) => panic!("Expected an access token error"),
        Err(mut err) => err
            .description()
            .expect("Error carries no description")
            .kind(),
    }
}

#[test]
fn full_code_flow() {
    let mut endpoint = TestEndpoint::new();
    let code = issue_code(&mut endpoint);

    let token = access_token(&mut endpoint, &exchange_request(&code))
        .unwrap_or_else(|_| panic!("Valid exchange was rejected"));

    let body: serde_json::Value = serde_json::from_str(&token.to_json()).unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"], "o2r-author");
    assert_eq!(body["orcid"], "0000-0001-6225-344X");

    let issued = body["access_token"].as_str().expect("Token missing");
    let grant = endpoint
        .issuer
        .recover_token(issued)
        .unwrap()
        .expect("Issued token not recoverable");
    assert_eq!(grant.owner_id, "3");
    assert_eq!(grant.scope.to_string(), "/authenticate");
}

#[test]
fn code_redeems_at_most_once() {
    let mut endpoint = TestEndpoint::new();
    let code = issue_code(&mut endpoint);

    access_token(&mut endpoint, &exchange_request(&code))
        .unwrap_or_else(|_| panic!("First redemption was rejected"));

    let err = access_token_error(access_token(&mut endpoint, &exchange_request(&code)));
    assert_eq!(err, AccessTokenErrorType::InvalidGrant);
}

#[test]
fn code_bound_to_client() {
    let mut endpoint = TestEndpoint::new().with_second_client();
    let code = issue_code(&mut endpoint);

    let request = CraftedRequest::new(&[
        ("grant_type", "authorization_code"),
        ("code", &code),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
    ])
    .with_basic_auth("APP-OTHER", "other-secret");

    let err = access_token_error(access_token(&mut endpoint, &request));
    assert_eq!(err, AccessTokenErrorType::InvalidGrant);

    // The failed attempt consumed the code for everyone.
    let err = access_token_error(access_token(&mut endpoint, &exchange_request(&code)));
    assert_eq!(err, AccessTokenErrorType::InvalidGrant);
}

#[test]
fn code_bound_to_redirect_uri() {
    let mut endpoint = TestEndpoint::new();
    let code = issue_code(&mut endpoint);

    let request = CraftedRequest::new(&[
        ("grant_type", "authorization_code"),
        ("code", &code),
        ("redirect_uri", "http://localhost:8080/somewhere/else"),
    ])
    .with_basic_auth(EXAMPLE_CLIENT_ID, EXAMPLE_CLIENT_SECRET);

    let err = access_token_error(access_token(&mut endpoint, &request));
    assert_eq!(err, AccessTokenErrorType::InvalidGrant);
}

#[test]
fn wrong_client_secret_rejected() {
    let mut endpoint = TestEndpoint::new();
    let code = issue_code(&mut endpoint);

    let request = CraftedRequest::new(&[
        ("grant_type", "authorization_code"),
        ("code", &code),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
    ])
    .with_basic_auth(EXAMPLE_CLIENT_ID, "not the secret");

    match access_token(&mut endpoint, &request) {
        Err(accesstoken::Error::Unauthorized(..)) => (),
        _ => panic!("Wrong secret did not yield an unauthorized response"),
    }
}

#[test]
fn duplicate_credentials_rejected() {
    let mut endpoint = TestEndpoint::new();
    let code = issue_code(&mut endpoint);

    // Offering Basic auth and body credentials at once is one attempt too many.
    let mut request = CraftedRequest::new(&[
        ("grant_type", "authorization_code"),
        ("code", &code),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
        ("client_id", EXAMPLE_CLIENT_ID),
        ("client_secret", EXAMPLE_CLIENT_SECRET),
    ])
    .with_basic_auth(EXAMPLE_CLIENT_ID, EXAMPLE_CLIENT_SECRET);
    request.allow_credentials_in_body = true;

    let err = access_token_error(access_token(&mut endpoint, &request));
    assert_eq!(err, AccessTokenErrorType::InvalidRequest);
}

#[test]
fn unsupported_grant_type() {
    let mut endpoint = TestEndpoint::new();
    let code = issue_code(&mut endpoint);

    let request = CraftedRequest::new(&[
        ("grant_type", "password"),
        ("code", &code),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
    ])
    .with_basic_auth(EXAMPLE_CLIENT_ID, EXAMPLE_CLIENT_SECRET);

    let err = access_token_error(access_token(&mut endpoint, &request));
    assert_eq!(err, AccessTokenErrorType::UnsupportedGrantType);
}

#[test]
fn unknown_client_is_ignored() {
    let mut endpoint = TestEndpoint::new();
    let request = CraftedRequest::new(&[
        ("client_id", "APP-UNKNOWN"),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
        ("response_type", "code"),
    ]);

    match authorization_code(&mut endpoint, &request, test_user()) {
        Err(authorization::Error::Ignore) => (),
        _ => panic!("Unknown client was not ignored"),
    }
}

#[test]
fn wrong_response_type_redirects() {
    let mut endpoint = TestEndpoint::new();
    let request = CraftedRequest::new(&[
        ("client_id", EXAMPLE_CLIENT_ID),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
        ("response_type", "token"),
    ]);

    match authorization_code(&mut endpoint, &request, test_user()) {
        Err(authorization::Error::Redirect(mut url)) => {
            assert_eq!(
                url.description().kind(),
                AuthorizationErrorType::UnsupportedResponseType
            );
        }
        _ => panic!("Wrong response type did not redirect"),
    }
}

#[test]
fn denied_transaction_redirects_with_access_denied() {
    let mut endpoint = TestEndpoint::new();
    let pending = authorization_code(&mut endpoint, &authorize_request(), test_user())
        .unwrap_or_else(|_| panic!("Authorization request was not accepted"));

    let url: Url = match pending.deny() {
        Err(authorization::Error::Redirect(error_url)) => error_url.into(),
        _ => panic!("Denial did not produce a redirect"),
    };

    assert!(url
        .query_pairs()
        .any(|(key, value)| key == "error" && value == "access_denied"));
    assert!(url.query_pairs().all(|(key, _)| key != "code"));
}

#[test]
fn deferred_transaction_resumes_once() {
    let mut endpoint = TestEndpoint::new();
    let mut transactions = TransactionMap::new(RandomGenerator::new(16));

    let pending = authorization_code(&mut endpoint, &authorize_request(), test_user())
        .unwrap_or_else(|_| panic!("Authorization request was not accepted"));
    let id = transactions.defer(pending);

    let resumed = transactions.resume(&id).expect("Parked transaction lost");
    assert!(transactions.resume(&id).is_none());

    resumed
        .authorize(&mut endpoint)
        .unwrap_or_else(|_| panic!("Resumed transaction could not be approved"));
}

#[test]
fn expired_transaction_not_resumable() {
    let mut endpoint = TestEndpoint::new();
    let mut transactions = TransactionMap::new(RandomGenerator::new(16));
    transactions.valid_for(Duration::seconds(-1));

    let pending = authorization_code(&mut endpoint, &authorize_request(), test_user())
        .unwrap_or_else(|_| panic!("Authorization request was not accepted"));
    let id = transactions.defer(pending);

    assert!(transactions.resume(&id).is_none());
}

#[test]
fn state_passes_through() {
    let mut endpoint = TestEndpoint::new();
    let request = CraftedRequest::new(&[
        ("client_id", EXAMPLE_CLIENT_ID),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
        ("response_type", "code"),
        ("state", "opaque-value"),
    ]);

    let pending = authorization_code(&mut endpoint, &request, test_user())
        .unwrap_or_else(|_| panic!("Authorization request was not accepted"));
    let url = match pending.authorize(&mut endpoint) {
        Ok(url) => url,
        Err(_) => panic!("Approval failed"),
    };

    assert!(url
        .query_pairs()
        .any(|(key, value)| key == "state" && value == "opaque-value"));
}

#[test]
fn client_credentials_flow() {
    let mut endpoint = TestEndpoint::new();
    let request = CraftedRequest::new(&[
        ("grant_type", "client_credentials"),
        ("scope", "/read-public"),
    ])
    .with_basic_auth(EXAMPLE_CLIENT_ID, EXAMPLE_CLIENT_SECRET);

    let token = client_credentials(&mut endpoint, &request)
        .unwrap_or_else(|_| panic!("Valid client credentials request was rejected"));

    let body: serde_json::Value = serde_json::from_str(&token.to_json()).unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "/read-public");
    assert!(body.get("user").is_none());

    let issued = body["access_token"].as_str().expect("Token missing");
    let grant = endpoint
        .issuer
        .recover_token(issued)
        .unwrap()
        .expect("Issued token not recoverable");
    assert_eq!(grant.owner_id, "o2rtest");
    assert_eq!(grant.client_id, EXAMPLE_CLIENT_ID);
}

#[test]
fn client_credentials_scope_must_match_exactly() {
    let mut endpoint = TestEndpoint::new();

    for scope in &["/authenticate", "/read-public /authenticate", ""] {
        let request = CraftedRequest::new(&[
            ("grant_type", "client_credentials"),
            ("scope", scope),
        ])
        .with_basic_auth(EXAMPLE_CLIENT_ID, EXAMPLE_CLIENT_SECRET);

        let err = access_token_error(client_credentials(&mut endpoint, &request));
        assert_eq!(err, AccessTokenErrorType::InvalidScope);
    }

    // A request without any scope asks for nothing this path can grant.
    let request = CraftedRequest::new(&[("grant_type", "client_credentials")])
        .with_basic_auth(EXAMPLE_CLIENT_ID, EXAMPLE_CLIENT_SECRET);
    let err = access_token_error(client_credentials(&mut endpoint, &request));
    assert_eq!(err, AccessTokenErrorType::InvalidScope);
}

#[test]
fn client_credentials_require_authentication() {
    let mut endpoint = TestEndpoint::new();
    let request = CraftedRequest::new(&[
        ("grant_type", "client_credentials"),
        ("scope", "/read-public"),
    ])
    .with_basic_auth(EXAMPLE_CLIENT_ID, "not the secret");

    match client_credentials(&mut endpoint, &request) {
        Err(accesstoken::Error::Unauthorized(..)) => (),
        _ => panic!("Wrong secret did not yield an unauthorized response"),
    }
}

#[test]
fn client_credentials_authentication_precedes_scope_policy() {
    let mut endpoint = TestEndpoint::new();

    // An unauthenticated caller learns nothing about scope policy, whatever it asks for.
    for scope in &["/authenticate", "/read-public /authenticate", ""] {
        let request = CraftedRequest::new(&[
            ("grant_type", "client_credentials"),
            ("scope", scope),
        ])
        .with_basic_auth(EXAMPLE_CLIENT_ID, "not the secret");

        match client_credentials(&mut endpoint, &request) {
            Err(accesstoken::Error::Unauthorized(..)) => (),
            Err(accesstoken::Error::Invalid(mut desc)) => panic!(
                "Wrong secret leaked a policy error: {:?}",
                desc.description().kind()
            ),
            _ => panic!("Wrong secret did not yield an unauthorized response"),
        }
    }
}

#[test]
fn missing_credentials_rejected() {
    let mut endpoint = TestEndpoint::new();
    let code = issue_code(&mut endpoint);

    // Neither Basic auth nor body credentials attached.
    let request = CraftedRequest::new(&[
        ("grant_type", "authorization_code"),
        ("code", &code),
        ("redirect_uri", EXAMPLE_REDIRECT_URI),
    ]);

    let err = access_token_error(access_token(&mut endpoint, &request));
    assert_eq!(err, AccessTokenErrorType::InvalidRequest);

    let request = CraftedRequest::new(&[
        ("grant_type", "client_credentials"),
        ("scope", "/read-public"),
    ]);

    let err = access_token_error(client_credentials(&mut endpoint, &request));
    assert_eq!(err, AccessTokenErrorType::InvalidRequest);
}
