//! OAuth client-credentials token source
//!
//! Tokens are fetched from the Okta authorization server and cached until
//! shortly before they expire. Machine-to-machine tokens carry the user's
//! organization in the `m2mProfile.organization` claim, which the client
//! falls back to when no organization is configured.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::error::ApiError;

/// Tokens are refreshed this long before their reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    pub organization: Option<String>,
}

struct CachedToken {
    token: AccessToken,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Claims {
    #[serde(default)]
    m2m_profile: Option<M2mProfile>,
}

#[derive(Deserialize)]
struct M2mProfile {
    #[serde(default)]
    organization: Option<String>,
}

pub struct TokenSource {
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(
        http_client: reqwest::Client,
        okta_org_url: &str,
        okta_auth_server: &str,
        client_id: String,
        client_secret: String,
    ) -> Self {
        let token_url = format!(
            "{}/oauth2/{}/v1/token",
            okta_org_url.trim_end_matches('/'),
            okta_auth_server
        );
        Self {
            http_client,
            token_url,
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached token, fetching a new one when it is missing or about to expire
    pub async fn token(&self) -> Result<AccessToken, ApiError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < entry.expires_at {
                return Ok(entry.token.clone());
            }
            tracing::debug!("access token about to expire, refreshing");
        }

        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn fetch(&self) -> Result<CachedToken, ApiError> {
        tracing::debug!("requesting access token from {}", self.token_url);

        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", "client_credentials"), ("scope", "m2m")])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!("token request failed with HTTP {}: {}", status, text);
            return Err(ApiError::AuthError(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let body: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::ParseError(format!("Invalid token response: {}", e)))?;

        Ok(CachedToken {
            token: AccessToken {
                organization: organization_claim(&body.access_token),
                value: body.access_token,
            },
            expires_at: expiry(Instant::now(), body.expires_in),
        })
    }
}

/// Expiry of a token issued at `now`; lifetimes past what `Instant` holds use the default
fn expiry(now: Instant, expires_in: Option<u64>) -> Instant {
    let lifetime = expires_in
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME);
    now.checked_add(lifetime)
        .unwrap_or(now + DEFAULT_TOKEN_LIFETIME)
}

/// Reads `m2mProfile.organization` from a JWT without verifying it
pub fn organization_claim(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    claims
        .m2m_profile
        .and_then(|p| p.organization)
        .filter(|org| !org.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn jwt(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[test]
    fn organization_claim_is_extracted() {
        let token = jwt(r#"{"m2mProfile":{"organization":"acme"}}"#);
        assert_eq!(organization_claim(&token), Some("acme".to_string()));
    }

    #[test]
    fn organization_claim_missing() {
        assert_eq!(organization_claim(&jwt(r#"{"sub":"x"}"#)), None);
        assert_eq!(organization_claim("opaque-token"), None);
    }

    #[tokio::test]
    async fn token_is_cached_between_calls() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/auth-server/v1/token")
            .match_header("authorization", "Basic aWQ6c2VjcmV0")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                mockito::Matcher::UrlEncoded("scope".into(), "m2m".into()),
            ]))
            .with_body(r#"{"access_token":"abc","expires_in":3600,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let source = TokenSource::new(
            reqwest::Client::new(),
            &server.url(),
            "auth-server",
            "id".to_string(),
            "secret".to_string(),
        );

        let first = source.token().await.unwrap();
        let second = source.token().await.unwrap();
        assert_eq!(first.value, "abc");
        assert_eq!(first, second);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn short_lived_token_is_refreshed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/auth-server/v1/token")
            .with_body(r#"{"access_token":"abc","expires_in":30}"#)
            .expect(2)
            .create_async()
            .await;

        let source = TokenSource::new(
            reqwest::Client::new(),
            &server.url(),
            "auth-server",
            "id".to_string(),
            "secret".to_string(),
        );

        source.token().await.unwrap();
        source.token().await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn expiry_falls_back_to_default_lifetime() {
        let now = Instant::now();
        assert_eq!(expiry(now, Some(30)), now + Duration::from_secs(30));
        assert_eq!(expiry(now, None), now + DEFAULT_TOKEN_LIFETIME);
        assert_eq!(expiry(now, Some(u64::MAX)), now + DEFAULT_TOKEN_LIFETIME);
    }

    #[tokio::test]
    async fn huge_token_lifetime_is_cached_with_default_expiry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/auth-server/v1/token")
            .with_body(r#"{"access_token":"abc","expires_in":18446744073709551615}"#)
            .expect(1)
            .create_async()
            .await;

        let source = TokenSource::new(
            reqwest::Client::new(),
            &server.url(),
            "auth-server",
            "id".to_string(),
            "secret".to_string(),
        );

        assert_eq!(source.token().await.unwrap().value, "abc");
        assert_eq!(source.token().await.unwrap().value, "abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/auth-server/v1/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        let source = TokenSource::new(
            reqwest::Client::new(),
            &server.url(),
            "auth-server",
            "id".to_string(),
            "wrong".to_string(),
        );

        assert!(matches!(source.token().await, Err(ApiError::AuthError(_))));
    }
}
