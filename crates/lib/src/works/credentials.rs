//! Service-account credentials: RS256 assertion + JWT-bearer token exchange.
//!
//! A fresh token is minted for every outbound operation; nothing is cached.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::WorksCredentials;
use crate::error::GatewayError;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_SCOPE: &str = "bot";
const ASSERTION_LIFETIME_SECS: i64 = 60 * 60;

/// Claims of the signed assertion.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Issues assertions and exchanges them for bot access tokens.
pub struct ServiceAccountCredentials {
    client_id: String,
    client_secret: String,
    service_account: String,
    token_url: String,
    signing_key: EncodingKey,
    client: reqwest::Client,
}

impl ServiceAccountCredentials {
    /// Parse the private key up front so a bad key fails at startup, not per request.
    pub fn new(creds: &WorksCredentials) -> Result<Self, GatewayError> {
        let signing_key = EncodingKey::from_rsa_pem(creds.private_key_pem.as_bytes()).map_err(|e| {
            GatewayError::Configuration(format!("PRIVATE_KEY is not a valid RSA PEM key: {}", e))
        })?;
        Ok(Self {
            client_id: creds.client_id.clone(),
            client_secret: creds.client_secret.clone(),
            service_account: creds.service_account.clone(),
            token_url: creds.token_url.clone(),
            signing_key,
            client: reqwest::Client::new(),
        })
    }

    /// Sign `{iss, sub, aud, iat, exp = iat + 1h}` with RS256.
    pub fn issue_assertion(&self) -> Result<String, GatewayError> {
        let issued_at = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.client_id.clone(),
            sub: self.service_account.clone(),
            aud: self.token_url.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| GatewayError::Auth(format!("signing assertion: {}", e)))
    }

    /// POST the assertion to the token endpoint and return `access_token`.
    pub async fn exchange_for_token(&self, assertion: &str) -> Result<String, GatewayError> {
        if assertion.is_empty() {
            return Err(GatewayError::Auth("assertion is empty".to_string()));
        }
        let form = [
            ("assertion", assertion),
            ("grant_type", JWT_BEARER_GRANT),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", TOKEN_SCOPE),
        ];
        let res = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Auth(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!("token endpoint returned {} {}", status, body)));
        }
        let data: TokenResponse = res
            .json()
            .await
            .map_err(|e| GatewayError::Auth(format!("parsing token response: {}", e)))?;
        data.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::Auth("token response has no access_token".to_string()))
    }

    /// Issue a fresh assertion and exchange it.
    pub async fn access_token(&self) -> Result<String, GatewayError> {
        let assertion = self.issue_assertion()?;
        let token = self.exchange_for_token(&assertion).await?;
        log::debug!("obtained bot access token");
        Ok(token)
    }
}
