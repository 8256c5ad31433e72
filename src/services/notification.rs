//! 通知传输服务 - 业务能力层
//!
//! 只负责"把一条消息交给传输层"能力。确认的是传输层已接收，
//! 不是收件人已读。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::NotifyError;

/// 一条通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
}

/// 传输层接收回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub recipient: String,
    pub accepted_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub fn now(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            accepted_at: Utc::now(),
        }
    }
}

/// 通知传输协作方
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(
        &self,
        message: &NotificationMessage,
        recipient: &str,
    ) -> Result<DeliveryReceipt, NotifyError>;
}

/// 追加写入本地文件的传输
///
/// 每条消息一行：`时间 | 收件方 | 标题 | 正文`
pub struct FileTransport {
    file_path: String,
}

impl FileTransport {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

#[async_trait]
impl NotificationTransport for FileTransport {
    async fn send(
        &self,
        message: &NotificationMessage,
        recipient: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let receipt = DeliveryReceipt::now(recipient);
        let line = format!(
            "{} | {} | {} | {}\n",
            receipt.accepted_at.format("%Y-%m-%d %H:%M:%S"),
            recipient,
            message.subject,
            message.body.replace('\n', " ")
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await
            .map_err(|e| NotifyError::transport(recipient, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| NotifyError::transport(recipient, e))?;
        file.flush()
            .await
            .map_err(|e| NotifyError::transport(recipient, e))?;

        debug!("通知已写入 {}: {}", self.file_path, message.subject);
        Ok(receipt)
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// HTTP webhook 传输，POST JSON
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send(
        &self,
        message: &NotificationMessage,
        recipient: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let payload = WebhookPayload {
            recipient,
            subject: &message.subject,
            body: &message.body,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::transport(recipient, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::rejected(
                recipient,
                format!("webhook 返回 {}", status),
            ));
        }

        debug!("通知已投递到 webhook: {}", message.subject);
        Ok(DeliveryReceipt::now(recipient))
    }
}
