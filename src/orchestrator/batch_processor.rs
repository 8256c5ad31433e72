//! 收件箱批处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责把收件目录里的文档逐个交给工作流引擎。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：组装提取/摘要/汇总/通知协作方，创建引擎
//! 2. **批量加载**：扫描收件目录，每个文件生成一个入站事件
//! 3. **并发控制**：使用 Semaphore 限制同时执行的文档数量
//! 4. **全局统计**：汇总成功/失败/通知投递失败的数量
//!
//! 通知投递失败无法在工作流内部处理，只能在这里上报给运维。

use crate::config::Config;
use crate::models::{load_inbox_events, DocumentEvent};
use crate::services::{
    FileAggregator, FileTransport, LlmSummarizer, NotificationTransport, TextSectionExtractor,
    WebhookTransport,
};
use crate::utils::logging;
use crate::workflow::{Collaborators, WorkflowEngine};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    engine: Arc<WorkflowEngine>,
}

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub notify_errors: usize,
}

impl App {
    /// 用默认协作方初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)
            .with_context(|| format!("无法写入日志文件: {}", config.output_log_file))?;
        logging::log_startup(&config);

        let extractor = TextSectionExtractor::new().context("章节提取器初始化失败")?;
        let summarizer = LlmSummarizer::new(&config).context("摘要服务初始化失败")?;
        let transport: Arc<dyn NotificationTransport> = match &config.notification_webhook_url {
            Some(url) => {
                info!("📨 通知方式: webhook ({})", url);
                Arc::new(WebhookTransport::new(url.clone()))
            }
            None => {
                info!("📨 通知方式: 文件 ({})", config.notification_log_file);
                Arc::new(FileTransport::new(config.notification_log_file.clone()))
            }
        };

        let collaborators = Collaborators {
            extractor: Arc::new(extractor),
            summarizer: Arc::new(summarizer),
            aggregator: Arc::new(FileAggregator::new(config.output_dir.clone())),
            transport,
        };
        let engine = Arc::new(WorkflowEngine::new(&config, collaborators));

        Ok(Self::with_engine(config, engine))
    }

    /// 使用已组装好的引擎
    pub fn with_engine(config: Config, engine: Arc<WorkflowEngine>) -> Self {
        Self { config, engine }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<ProcessingStats> {
        info!("\n📁 正在扫描收件目录: {}", self.config.inbox_folder);
        let events = load_inbox_events(&self.config.inbox_folder).await?;

        if events.is_empty() {
            warn!("⚠️ 收件目录中没有文档，程序结束");
            return Ok(ProcessingStats::default());
        }

        logging::log_documents_loaded(events.len(), self.config.max_concurrent_documents);

        let stats = self.process_all(events).await?;

        logging::print_final_stats(
            stats.completed,
            stats.failed,
            stats.notify_errors,
            stats.total,
            &self.config.output_log_file,
        );

        if stats.notify_errors > 0 {
            anyhow::bail!("{} 条终态通知投递失败，请人工处理", stats.notify_errors);
        }
        Ok(stats)
    }

    /// 处理一组入站事件，同时执行的文档数不超过配置上限
    pub async fn process_all(&self, events: Vec<DocumentEvent>) -> Result<ProcessingStats> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_documents.max(1)));
        let mut stats = ProcessingStats {
            total: events.len(),
            ..Default::default()
        };
        let mut handles = Vec::new();

        for event in events {
            let permit = semaphore.clone().acquire_owned().await?;
            let document_id = event.document_id.clone();
            let execution = self.engine.submit(event);
            info!("[文档 {}] 已提交 (执行 {})", document_id, execution.execution_id);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                execution.wait().await
            });
            handles.push((document_id, handle));
        }

        for (document_id, handle) in handles {
            let report = match handle.await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) | Err(e) => {
                    error!("[文档 {}] 执行任务异常终止: {}", document_id, e);
                    stats.failed += 1;
                    continue;
                }
            };

            if report.outcome.is_completed() {
                stats.completed += 1;
            } else {
                stats.failed += 1;
            }
            if let Err(e) = &report.delivery {
                error!("[文档 {}] 📭 终态通知未送达: {}", document_id, e);
                stats.notify_errors += 1;
            }
        }

        Ok(stats)
    }
}
