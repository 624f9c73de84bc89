//! LINE WORKS Bot API client: credentials, message delivery and attachments.
//!
//! The gateway validates a payload, mints a token via [`ServiceAccountCredentials`], then calls
//! [`WorksClient`] to forward it. No state is kept between calls.

mod attachments;
mod credentials;
mod messages;

pub use attachments::{DownloadStream, DownloadTarget, StagedFile, UploadResult};
pub use credentials::{AssertionClaims, ServiceAccountCredentials};
pub use messages::{
    prepare_message, ContentSource, CoverBackground, ImageAspectRatio, ImageSize, MessageContent,
    MessageType, OutboundMessage, Target,
};

use serde::Serialize;

use crate::config::WorksCredentials;
use crate::error::GatewayError;

/// HTTP client bound to one bot (`{apiBase}/bots/{botId}`).
#[derive(Clone)]
pub struct WorksClient {
    api_base: reqwest::Url,
    bot_id: String,
    client: reqwest::Client,
    /// Attachment download resolution must see the 3xx itself.
    no_redirect_client: reqwest::Client,
}

impl WorksClient {
    pub fn new(creds: &WorksCredentials) -> Result<Self, GatewayError> {
        let api_base = reqwest::Url::parse(creds.api_base.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                GatewayError::Configuration(format!("api base is not a valid URL: {}", creds.api_base))
            })?;
        let no_redirect_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Configuration(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            api_base,
            bot_id: creds.bot_id.clone(),
            client: reqwest::Client::new(),
            no_redirect_client,
        })
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// `{apiBase}/bots/{botId}/{segments...}` with every segment percent-encoded on its own,
    /// so an id can never add or climb path levels.
    fn bot_url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push("bots")
                .push(&self.bot_id)
                .extend(segments);
        }
        url
    }

    /// POST a JSON body with bearer auth. Non-2xx is reported with status and body text.
    async fn post_json<T: Serialize + ?Sized>(
        &self,
        token: &str,
        url: reqwest::Url,
        body: &T,
    ) -> Result<reqwest::Response, String> {
        let res = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} {}", status, body));
        }
        Ok(res)
    }
}
