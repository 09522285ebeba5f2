use std::time::Duration;

use axum::async_trait;
use serde_json::json;
use tracing::{debug, error};

use crate::config::MailConfig;

/// Out-of-band delivery channel for OTP codes. The auth flow only needs a
/// send that may fail; the concrete transport lives behind this trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

/// Mail-API client over HTTPS. Every request is bounded by the configured
/// timeout so a stuck provider cannot hold a handler open.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: cfg.api_url.clone(),
            api_key: cfg.api_key.clone(),
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!(%status, body = %body, "mail API error");
            anyhow::bail!("mail API returned {}", status);
        }
        debug!(to = %to, "email sent");
        Ok(())
    }
}
