use async_trait::async_trait;
use tracing::info;

/// Outbound notification seam. Delivery itself (SMTP, templates) lives
/// behind this trait; the auth flow only ever fires and forgets.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, to: &str, name: &str, url: &str) -> anyhow::Result<()>;
}

/// Logs the send instead of talking to a mail relay. Stands in until a real
/// transport is wired up in deployment.
pub struct LogMailer {
    pub from: String,
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_welcome(&self, to: &str, name: &str, url: &str) -> anyhow::Result<()> {
        info!(from = %self.from, to = %to, name = %name, url = %url, "welcome email queued");
        Ok(())
    }
}
