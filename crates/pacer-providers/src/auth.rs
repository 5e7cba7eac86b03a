use anyhow::Context;
use keyring::Entry;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::info;

const SERVICE: &str = "pacer";

const EXPIRY_LEEWAY_SECS: i64 = 60;

pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;

/// Supplies a bearer token for each request batch.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token<'a>(&'a self) -> TokenFuture<'a>;
}

/// A fixed token, for tests and short-lived sessions.
pub struct StaticToken(pub String);

impl AccessTokenProvider for StaticToken {
    fn access_token<'a>(&'a self) -> TokenFuture<'a> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl OAuthToken {
    pub fn requires_refresh_at(&self, now: i64, leeway_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now + leeway_secs)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub fn get_token(account: &str) -> anyhow::Result<OAuthToken> {
    let entry = Entry::new(SERVICE, account).context("open keyring entry")?;
    let value = entry.get_password().context("read token from keyring")?;
    match serde_json::from_str::<OAuthToken>(&value) {
        Ok(token) => Ok(token),
        Err(_) => Ok(OAuthToken {
            access_token: value,
            refresh_token: None,
            expires_at: None,
            token_endpoint: None,
            client_id: None,
            client_secret: None,
        }),
    }
}

pub fn set_token(account: &str, token: &OAuthToken) -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE, account).context("open keyring entry")?;
    let payload = serde_json::to_string(token).context("serialize oauth token")?;
    entry
        .set_password(&payload)
        .context("write oauth token to keyring")
}

pub fn delete_token(account: &str) -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE, account).context("open keyring entry")?;
    entry
        .delete_credential()
        .context("delete token from keyring")
}

/// Exchanges the refresh token for a new access token.
pub async fn refresh_token(client: &Client, token: &OAuthToken) -> anyhow::Result<OAuthToken> {
    let refresh_token = token
        .refresh_token
        .clone()
        .context("token expired without refresh token")?;
    let endpoint = token
        .token_endpoint
        .clone()
        .context("token is missing its token endpoint")?;
    let client_id = token
        .client_id
        .clone()
        .context("token is missing its client id")?;

    let mut form = vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
    ];
    if let Some(secret) = token.client_secret.clone() {
        form.push(("client_secret", secret));
    }

    let response: RefreshTokenResponse = client
        .post(&endpoint)
        .form(&form)
        .send()
        .await
        .context("request oauth refresh token")?
        .error_for_status()
        .context("refresh token status")?
        .json()
        .await
        .context("decode refresh token response")?;

    if let Some(error) = response.error {
        let message = response.message.unwrap_or(error);
        anyhow::bail!("oauth refresh failed: {message}");
    }

    let mut refreshed = token.clone();
    refreshed.access_token = response
        .access_token
        .context("refresh response without access token")?;
    if let Some(refresh) = response.refresh_token {
        refreshed.refresh_token = Some(refresh);
    }
    refreshed.expires_at = response.expires_at.or_else(|| {
        response
            .expires_in
            .map(|expires_in| now_epoch_seconds() + expires_in)
    });
    Ok(refreshed)
}

/// Tokens read from the OS keyring, refreshed and written back when expired.
pub struct KeyringTokens {
    account: String,
    client: Client,
    refresh_lock: Mutex<()>,
}

impl KeyringTokens {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            client: Client::new(),
            refresh_lock: Mutex::new(()),
        }
    }

    async fn ensure_fresh(&self) -> anyhow::Result<String> {
        let _guard = self.refresh_lock.lock().await;
        let token = get_token(&self.account)?;
        if !token.requires_refresh_at(now_epoch_seconds(), EXPIRY_LEEWAY_SECS) {
            return Ok(token.access_token);
        }
        let refreshed = refresh_token(&self.client, &token)
            .await
            .with_context(|| format!("refresh token for {}", self.account))?;
        set_token(&self.account, &refreshed)?;
        info!(account = %self.account, "access token refreshed");
        Ok(refreshed.access_token)
    }
}

impl AccessTokenProvider for KeyringTokens {
    fn access_token<'a>(&'a self) -> TokenFuture<'a> {
        Box::pin(self.ensure_fresh())
    }
}

fn now_epoch_seconds() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: Option<i64>) -> OAuthToken {
        OAuthToken {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
            token_endpoint: Some("https://example.com/oauth/token".to_string()),
            client_id: Some("client".to_string()),
            client_secret: None,
        }
    }

    #[test]
    fn requires_refresh_with_leeway() {
        let token = token(Some(100));
        assert!(token.requires_refresh_at(50, 60));
        assert!(!token.requires_refresh_at(0, 0));
        assert!(!self::token(None).requires_refresh_at(i64::MAX - 100, 60));
    }

    #[test]
    fn stored_token_roundtrips() {
        let json = serde_json::to_string(&token(Some(1234))).unwrap();
        let decoded: OAuthToken = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, token(Some(1234)));
    }

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        let provider = StaticToken("abc".into());
        assert_eq!(provider.access_token().await.unwrap(), "abc");
    }
}
