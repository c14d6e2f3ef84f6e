//! Identity users attached to the account.

use crate::error::Error;
use crate::http_client::HttpClient;
use crate::identity::Account;
use crate::utils::{string_or_number, url_encode};
use serde::Deserialize;

const IDENTITY_SERVICE: &str = "identity";

#[derive(Clone, Debug, Deserialize)]
pub struct UserDetail {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: UserDetail,
}

#[derive(Deserialize)]
struct UsersEnvelope {
    users: Vec<UserDetail>,
}

/// The user collection. The lookup facade treats an absent user as `None`;
/// [`User::details`] keeps the raw `NotFound` error for callers that want it.
pub struct Users {
    client: HttpClient,
}

impl Users {
    pub(crate) async fn new(account: &Account) -> Result<Self, Error> {
        Ok(Self {
            client: account.http_client(IDENTITY_SERVICE, None).await?,
        })
    }

    /// All users on the account.
    pub async fn list(&self) -> Result<Vec<UserDetail>, Error> {
        let path = format!("{}/users", self.client.base_path());
        let resp = self.client.get(&path, Default::default()).await?;
        let envelope: UsersEnvelope = serde_json::from_str(&resp.text().await?)?;
        Ok(envelope.users)
    }

    /// Look a user up by username; `None` when the provider has no such
    /// user.
    pub async fn get(&self, username: &str) -> Result<Option<UserDetail>, Error> {
        match self.user(username).details().await {
            Ok(detail) => Ok(Some(detail)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// A handle on one username. No network call until details are fetched.
    pub fn user(&self, username: &str) -> User {
        User {
            client: self.client.clone(),
            username: username.to_owned(),
        }
    }
}

/// Handle on a single user.
pub struct User {
    client: HttpClient,
    username: String,
}

impl User {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Fetch the user record. Errors with [`Error::NotFound`] when the user
    /// doesn't exist; see [`Users::get`] for the option-returning form.
    pub async fn details(&self) -> Result<UserDetail, Error> {
        let path = format!(
            "{}/users?name={}",
            self.client.base_path(),
            url_encode(&self.username)
        );
        let resp = self.client.get(&path, Default::default()).await?;
        let envelope: UserEnvelope = serde_json::from_str(&resp.text().await?)?;
        Ok(envelope.user)
    }
}
