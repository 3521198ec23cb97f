//! Runtime configuration and the built-in test fixtures.
//!
//! All knobs are read from the environment with the same variable names and defaults
//! the deployed service uses, so a container can be configured without a config file.
//! The fixture set mirrors the test identities the companion services integrate
//! against: three ORCID-like users and one registered client application.
use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::primitives::directory::User;
use crate::primitives::registrar::Client;

/// Authorization levels assigned to the test users.
pub mod level {
    /// Full administrative rights.
    pub const ADMIN: u32 = 1000;

    /// May edit content of other users.
    pub const EDITOR: u32 = 500;

    /// A regular known user.
    pub const KNOWN: u32 = 100;
}

/// Complete runtime configuration of the server.
#[derive(Clone, Debug)]
pub struct Config {
    /// Port the HTTP front-end binds to. `GUESTLISTER_PORT`, default 8083.
    pub port: u16,

    /// Connection string of the backing database. `GUESTLISTER_MONGODB`.
    pub mongo_location: String,

    /// Database name. `GUESTLISTER_MONGODB_DATABASE`, default `muncher`.
    pub mongo_database: String,

    /// Retry behaviour while waiting for the database at startup.
    pub startup: StartupConfig,

    /// Parameters advertised to relying services.
    pub oauth: OAuthConfig,

    /// Secret used to sign session cookies. `SESSION_SECRET`, default `o2r`.
    pub session_secret: String,

    /// Whether the fixture users are created at startup. `CREATE_USERS_ON_STARTUP`.
    pub create_users_on_startup: bool,
}

/// Bounded-retry parameters for the startup connection loop.
#[derive(Clone, Debug)]
pub struct StartupConfig {
    /// How often to retry before giving up.
    pub attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
}

/// The oauth endpoints and default client parameters of this provider.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    /// Url of the authorize endpoint. `OAUTH_URL_AUTHORIZATION`.
    pub authorization_url: String,

    /// Url of the token endpoint. `OAUTH_URL_TOKEN`.
    pub token_url: String,

    /// Url the user agent returns to after the decision. `OAUTH_URL_CALLBACK`.
    pub callback_url: String,

    /// Client identifier relying services present. `OAUTH_CLIENT_ID`.
    pub client_id: Option<String>,

    /// Client secret for that identifier. `OAUTH_CLIENT_SECRET`.
    pub client_secret: Option<String>,

    /// Scope requested on the login path. `OAUTH_SCOPE`, default `/authenticate`.
    pub scope: String,
}

impl Config {
    /// Assemble the configuration from environment variables and defaults.
    pub fn from_env() -> Config {
        let port = env::var("GUESTLISTER_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(8083);
        let host = format!("http://localhost:{}", port);

        Config {
            port,
            mongo_location: env::var("GUESTLISTER_MONGODB")
                .unwrap_or_else(|_| "mongodb://localhost/".to_string()),
            mongo_database: env::var("GUESTLISTER_MONGODB_DATABASE")
                .unwrap_or_else(|_| "muncher".to_string()),
            startup: StartupConfig {
                attempts: 30,
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_millis(3000),
            },
            oauth: OAuthConfig {
                authorization_url: env::var("OAUTH_URL_AUTHORIZATION")
                    .unwrap_or_else(|_| format!("{}/api/v1/oauth/authorize", host)),
                token_url: env::var("OAUTH_URL_TOKEN")
                    .unwrap_or_else(|_| format!("{}/api/v1/oauth/token", host)),
                callback_url: env::var("OAUTH_URL_CALLBACK")
                    .unwrap_or_else(|_| format!("{}/api/v1/auth/login", host)),
                client_id: env::var("OAUTH_CLIENT_ID").ok(),
                client_secret: env::var("OAUTH_CLIENT_SECRET").ok(),
                scope: env::var("OAUTH_SCOPE").unwrap_or_else(|_| "/authenticate".to_string()),
            },
            session_secret: env::var("SESSION_SECRET").unwrap_or_else(|_| "o2r".to_string()),
            create_users_on_startup: env::var("CREATE_USERS_ON_STARTUP")
                .map(|value| !matches!(value.as_str(), "false" | "no" | "0"))
                .unwrap_or(true),
        }
    }
}

/// A user as declared in a fixture definition.
#[derive(Clone, Debug, Deserialize)]
pub struct UserSeed {
    /// Opaque internal id.
    pub id: String,

    /// Login name.
    pub username: String,

    /// Plaintext password, encoded by the directory during seeding.
    pub password: String,

    /// Human readable display name.
    pub name: String,

    /// The ORCID-like identity reference.
    pub orcid: String,

    /// Authorization level.
    pub level: u32,
}

/// A client application as declared in a fixture definition.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSeed {
    /// Opaque internal id.
    pub id: String,

    /// Human readable display name.
    pub name: String,

    /// Public client identifier.
    pub client_id: String,

    /// Confidential client secret, encoded by the registrar during seeding.
    pub client_secret: String,

    /// Whether the consent step may be skipped.
    pub is_trusted: bool,
}

/// The identities seeded into the credential stores at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct Fixtures {
    /// Users for the directory.
    pub users: Vec<UserSeed>,

    /// Client applications for the registrar.
    pub clients: Vec<ClientSeed>,
}

impl Fixtures {
    /// The built-in test identities.
    pub fn builtin() -> Fixtures {
        Fixtures {
            users: vec![
                UserSeed {
                    id: "1".to_string(),
                    username: "o2r-admin".to_string(),
                    password: "secretadmin3".to_string(),
                    name: "Adi Admin".to_string(),
                    orcid: "0000-0002-1701-2564".to_string(),
                    level: level::ADMIN,
                },
                UserSeed {
                    id: "2".to_string(),
                    username: "o2r-editor".to_string(),
                    password: "secreteditor2".to_string(),
                    name: "Edd Editor".to_string(),
                    orcid: "0000-0001-5930-4867".to_string(),
                    level: level::EDITOR,
                },
                UserSeed {
                    id: "3".to_string(),
                    username: "o2r-author".to_string(),
                    password: "secretauthor1".to_string(),
                    name: "Augusta Authora".to_string(),
                    orcid: "0000-0001-6225-344X".to_string(),
                    level: level::EDITOR,
                },
            ],
            clients: vec![ClientSeed {
                id: "3".to_string(),
                name: "o2rtest".to_string(),
                client_id: "APP-8XINMK52KZVU".to_string(),
                client_secret: "2afa48e4-9473-446f-88bd".to_string(),
                is_trusted: true,
            }],
        }
    }

    /// Parse fixtures from a json document.
    pub fn from_json(json: &str) -> Result<Fixtures, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<UserSeed> for User {
    fn from(seed: UserSeed) -> User {
        User {
            id: seed.id,
            username: seed.username,
            password: seed.password,
            name: seed.name,
            orcid: seed.orcid,
            level: seed.level,
        }
    }
}

impl From<ClientSeed> for Client {
    fn from(seed: ClientSeed) -> Client {
        Client {
            id: seed.id,
            name: seed.name,
            identifier: seed.client_id,
            secret: seed.client_secret,
            trusted: seed.is_trusted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_fixtures() {
        let fixtures = Fixtures::builtin();
        assert_eq!(fixtures.users.len(), 3);
        assert_eq!(fixtures.clients.len(), 1);
        assert_eq!(fixtures.clients[0].client_id, "APP-8XINMK52KZVU");
        assert!(fixtures
            .users
            .iter()
            .all(|user| user.orcid.len() == "0000-0002-1701-2564".len()));
        let levels: Vec<_> = fixtures.users.iter().map(|user| user.level).collect();
        assert_eq!(levels, [level::ADMIN, level::EDITOR, level::EDITOR]);
    }

    #[test]
    fn fixtures_from_json() {
        let fixtures = Fixtures::from_json(
            r#"{
                "users": [
                    { "id": "7", "username": "tester", "password": "pw", "name": "Test User",
                      "orcid": "0000-0001-2345-6789", "level": 100 }
                ],
                "clients": [
                    { "id": "1", "name": "demo", "clientId": "APP-DEMO",
                      "clientSecret": "secret", "isTrusted": false }
                ]
            }"#,
        )
        .expect("Fixture document should parse");

        assert_eq!(fixtures.users[0].username, "tester");
        assert!(!fixtures.clients[0].is_trusted);
    }
}
