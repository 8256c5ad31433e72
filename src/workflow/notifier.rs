//! 终态通知
//!
//! 每次执行由引擎在终态调用一次 `notify`。投递失败只返回给调用方，
//! 不会再进入工作流。

use std::sync::Arc;

use tracing::{error, info};

use crate::error::NotifyError;
use crate::services::{DeliveryReceipt, NotificationMessage, NotificationTransport};
use crate::workflow::execution_ctx::ExecutionOutcome;

pub struct Notifier {
    transport: Arc<dyn NotificationTransport>,
    recipient: String,
}

impl Notifier {
    pub fn new(transport: Arc<dyn NotificationTransport>, recipient: impl Into<String>) -> Self {
        Self {
            transport,
            recipient: recipient.into(),
        }
    }

    /// 消息内容只取决于执行结果
    pub fn format_message(outcome: &ExecutionOutcome) -> NotificationMessage {
        match outcome {
            ExecutionOutcome::Completed {
                execution_id,
                document_id,
                artifact,
                section_count,
                failed_sections,
            } => {
                let skipped = if *failed_sections > 0 {
                    format!("，其中 {} 个章节摘要失败已跳过", failed_sections)
                } else {
                    String::new()
                };
                NotificationMessage {
                    subject: format!("文档处理完成: {}", document_id),
                    body: format!(
                        "文档 {} 已完成 {} 个章节的摘要{}，输出: {} (执行 {})",
                        document_id, section_count, skipped, artifact, execution_id
                    ),
                }
            }
            ExecutionOutcome::Failed {
                execution_id,
                document_id,
                failure,
            } => NotificationMessage {
                subject: format!("文档处理失败: {}", document_id),
                body: format!(
                    "文档 {} 在 {} 阶段失败 ({}): {} (执行 {})",
                    document_id, failure.stage, failure.kind, failure.cause, execution_id
                ),
            },
        }
    }

    pub async fn notify(&self, outcome: &ExecutionOutcome) -> Result<DeliveryReceipt, NotifyError> {
        let message = Self::format_message(outcome);
        match self.transport.send(&message, &self.recipient).await {
            Ok(receipt) => {
                info!(
                    "[文档 {}] 📨 通知已发送给 {}: {}",
                    outcome.document_id(),
                    self.recipient,
                    message.subject
                );
                Ok(receipt)
            }
            Err(e) => {
                error!(
                    "[文档 {}] ❌ 通知投递失败 (执行 {}): {}",
                    outcome.document_id(),
                    outcome.execution_id(),
                    e
                );
                Err(e)
            }
        }
    }
}
