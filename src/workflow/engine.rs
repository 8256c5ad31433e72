//! 工作流引擎 - 流程层
//!
//! 核心职责：驱动"一个文档"从入站到终态通知的完整状态机
//!
//! 流程顺序：
//! 1. CheckFileType：按扩展名快速拒绝
//! 2. ExtractText：提取有序章节（空列表直接失败）
//! 3. FanOutSummarize：受限并发摘要每个章节
//! 4. AggregateSummaries：汇总并写出产物
//! 5. NotifyCompletion / NotifyFailure：恰好一次通知

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{FailureKind, FailureRecord, NotifyError, Stage, TaskError, TaskFailure};
use crate::infrastructure::TaskExecutor;
use crate::models::{DocumentEvent, Section, SectionOutcome, SectionResult};
use crate::services::{
    Aggregator, DeliveryReceipt, NotificationTransport, SectionExtractor, Summarizer,
};
use crate::utils::logging::truncate_text;
use crate::workflow::execution_ctx::{ExecutionCtx, ExecutionOutcome, StageOutput};
use crate::workflow::fan_out::{FanOut, FanOutOutcome, WorkerLost};
use crate::workflow::notifier::Notifier;
use crate::workflow::state::{StateTransition, WorkflowState};

/// 引擎依赖的外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn SectionExtractor>,
    pub summarizer: Arc<dyn Summarizer>,
    pub aggregator: Arc<dyn Aggregator>,
    pub transport: Arc<dyn NotificationTransport>,
}

/// 一次执行归档后的报告
#[derive(Debug)]
pub struct ExecutionReport {
    pub execution_id: String,
    pub document_id: String,
    pub final_state: WorkflowState,
    pub outcome: ExecutionOutcome,
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 通知投递结果；失败需要由调用方/运维处理
    pub delivery: Result<DeliveryReceipt, NotifyError>,
}

impl ExecutionReport {
    pub fn notification_delivered(&self) -> bool {
        self.delivery.is_ok()
    }
}

/// `submit` 返回的句柄
pub struct ExecutionHandle {
    pub execution_id: String,
    handle: JoinHandle<ExecutionReport>,
}

impl ExecutionHandle {
    /// 等待执行结束
    pub async fn wait(self) -> Result<ExecutionReport, JoinError> {
        self.handle.await
    }
}

/// 工作流引擎
///
/// - 不持有任何执行级状态，同一个引擎可以并发驱动任意多个文档
/// - 阶段之间只通过 `ExecutionCtx` 传递数据
/// - 每次执行恰好调用一次 `Notifier::notify`
pub struct WorkflowEngine {
    accepted_extension: String,
    fan_out: FanOut,
    executor: TaskExecutor,
    extractor: Arc<dyn SectionExtractor>,
    summarizer: Arc<dyn Summarizer>,
    aggregator: Arc<dyn Aggregator>,
    notifier: Notifier,
}

impl WorkflowEngine {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        Self {
            accepted_extension: config.accepted_file_extension.clone(),
            fan_out: FanOut::new(config.max_concurrency, config.section_failure_policy),
            executor: TaskExecutor::from_config(config),
            extractor: collaborators.extractor,
            summarizer: collaborators.summarizer,
            aggregator: collaborators.aggregator,
            notifier: Notifier::new(collaborators.transport, config.notification_recipient.clone()),
        }
    }

    /// 替换任务执行器（测试中用来缩短超时和退避）
    pub fn with_executor(mut self, executor: TaskExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// 提交一个入站事件，立即返回执行 ID，执行在后台进行
    pub fn submit(self: &Arc<Self>, event: DocumentEvent) -> ExecutionHandle {
        let execution_id = new_execution_id();
        let engine = Arc::clone(self);
        let id = execution_id.clone();
        let handle = tokio::spawn(async move { engine.execute(id, event).await });
        ExecutionHandle {
            execution_id,
            handle,
        }
    }

    /// 在当前任务中执行到终态
    pub async fn run(&self, event: DocumentEvent) -> ExecutionReport {
        self.execute(new_execution_id(), event).await
    }

    async fn execute(&self, execution_id: String, event: DocumentEvent) -> ExecutionReport {
        let mut ctx = ExecutionCtx::new(execution_id, event);
        log_execution_start(&ctx);

        loop {
            let step = match ctx.state() {
                WorkflowState::CheckFileType => self.check_file_type(&ctx),
                WorkflowState::ExtractText => self.extract_text(&ctx).await,
                WorkflowState::FanOutSummarize => self.fan_out_summarize(&ctx).await,
                WorkflowState::AggregateSummaries => self.aggregate_summaries(&ctx).await,
                WorkflowState::NotifyCompletion | WorkflowState::NotifyFailure => break,
            };
            if let Err(failure) = &step {
                warn!(
                    "[文档 {}] ⚠️ {} 阶段失败: {}",
                    ctx.document_id(),
                    failure.stage,
                    failure.cause
                );
            }
            ctx = ctx.apply(step);
        }

        let outcome = ctx.outcome();
        let delivery = self.notifier.notify(&outcome).await;
        let finished_at = Utc::now();
        log_execution_complete(&ctx, &outcome, finished_at);

        ExecutionReport {
            execution_id: ctx.execution_id().to_string(),
            document_id: ctx.document_id().to_string(),
            final_state: ctx.state(),
            outcome,
            transitions: ctx.transitions().to_vec(),
            started_at: ctx.started_at(),
            finished_at,
            delivery,
        }
    }

    /// 只看扩展名，在任何昂贵操作之前拒绝
    fn check_file_type(&self, ctx: &ExecutionCtx) -> Result<StageOutput, FailureRecord> {
        if ctx.document().has_extension(&self.accepted_extension) {
            Ok(StageOutput::Validated)
        } else {
            Err(FailureRecord::validation(
                Stage::Validate,
                ctx.document_id(),
                format!("文件类型不受支持，只接受 {}", self.accepted_extension),
            ))
        }
    }

    async fn extract_text(&self, ctx: &ExecutionCtx) -> Result<StageOutput, FailureRecord> {
        info!("[文档 {}] 📄 开始提取章节...", ctx.document_id());

        let document = ctx.document().clone();
        let extractor = self.extractor.clone();
        let sections = self
            .executor
            .execute(Stage::Extract, ctx.document_id(), || {
                let extractor = extractor.clone();
                let document = document.clone();
                async move { extractor.extract(&document).await }
            })
            .await
            .map_err(|failure| FailureRecord::from_task(&failure))?;

        // 零章节不能扇出成"空成功"
        if sections.is_empty() {
            return Err(FailureRecord::validation(
                Stage::Extract,
                ctx.document_id(),
                "未提取到任何章节",
            ));
        }

        let sections: Vec<Section> = sections
            .into_iter()
            .enumerate()
            .map(|(index, section)| Section { index, ..section })
            .collect();
        info!("[文档 {}] ✓ 提取到 {} 个章节", ctx.document_id(), sections.len());
        for section in &sections {
            debug!(
                "[文档 {}]   #{} {}: {}",
                ctx.document_id(),
                section.index,
                section.name,
                truncate_text(&section.text, 60)
            );
        }
        Ok(StageOutput::Extracted(sections))
    }

    async fn fan_out_summarize(&self, ctx: &ExecutionCtx) -> Result<StageOutput, FailureRecord> {
        let sections = ctx.sections().to_vec();
        info!(
            "[文档 {}] 🔀 开始摘要 {} 个章节 (并发上限 {}, 策略 {:?})",
            ctx.document_id(),
            sections.len(),
            self.fan_out.max_concurrency(),
            self.fan_out.policy()
        );

        let summarizer = self.summarizer.clone();
        let executor = self.executor.clone();
        let document_id = ctx.document_id().to_string();
        let lost_document_id = document_id.clone();

        let outcome = self
            .fan_out
            .run(
                sections.clone(),
                move |_, section: Section| {
                    let summarizer = summarizer.clone();
                    let executor = executor.clone();
                    let document_id = document_id.clone();
                    async move {
                        executor
                            .execute(Stage::Summarize, &document_id, || {
                                let summarizer = summarizer.clone();
                                let text = section.text.clone();
                                async move { summarizer.summarize(&text).await }
                            })
                            .await
                    }
                },
                |lost: WorkerLost| TaskFailure {
                    stage: Stage::Summarize,
                    document_id: lost_document_id.clone(),
                    attempts: 1,
                    error: TaskError::permanent(format!(
                        "章节 #{} 摘要任务异常退出: {}",
                        lost.index, lost.reason
                    )),
                },
            )
            .await;

        match outcome {
            FanOutOutcome::Completed(results) => {
                let results = collect_section_results(&sections, results);
                let failed = results.iter().filter(|r| r.is_failed()).count();

                if failed == results.len() {
                    let first_cause = results
                        .iter()
                        .find_map(|r| match &r.outcome {
                            SectionOutcome::Failed(f) => Some(f.cause().to_string()),
                            SectionOutcome::Summarized(_) => None,
                        })
                        .unwrap_or_default();
                    return Err(FailureRecord {
                        stage: Stage::Summarize,
                        kind: FailureKind::PermanentTask,
                        cause: format!("全部 {} 个章节摘要失败: {}", failed, first_cause),
                        document_id: ctx.document_id().to_string(),
                    });
                }
                if failed > 0 {
                    warn!(
                        "[文档 {}] ⚠️ {}/{} 个章节摘要失败，继续汇总其余章节",
                        ctx.document_id(),
                        failed,
                        results.len()
                    );
                } else {
                    info!("[文档 {}] ✓ 全部章节摘要完成", ctx.document_id());
                }
                Ok(StageOutput::Summarized(results))
            }
            FanOutOutcome::Aborted {
                failed_index,
                error,
                completed,
            } => {
                let name = sections
                    .get(failed_index)
                    .map(|s| s.name.as_str())
                    .unwrap_or_default();
                warn!(
                    "[文档 {}] ⚠️ 章节 #{} {} 失败，已取消其余任务 (已完成 {} 个)",
                    ctx.document_id(),
                    failed_index,
                    name,
                    completed.len()
                );
                // 已完成的章节不会被汇总，但要在失败记录里留下
                let finished: Vec<String> = completed
                    .iter()
                    .filter_map(|(index, _)| sections.get(*index))
                    .map(|s| format!("#{} {}", s.index, s.name))
                    .collect();
                let finished = if finished.is_empty() {
                    "无".to_string()
                } else {
                    finished.join(", ")
                };

                let mut record = FailureRecord::from_task(&error);
                record.cause = format!(
                    "章节 #{} {}: {}；取消前已完成: {}",
                    failed_index,
                    name,
                    error.cause(),
                    finished
                );
                Err(record)
            }
        }
    }

    async fn aggregate_summaries(&self, ctx: &ExecutionCtx) -> Result<StageOutput, FailureRecord> {
        info!("[文档 {}] 📦 开始汇总...", ctx.document_id());

        let document = ctx.document().clone();
        let results = ctx.section_results().to_vec();
        let aggregator = self.aggregator.clone();
        let artifact = self
            .executor
            .execute(Stage::Aggregate, ctx.document_id(), || {
                let aggregator = aggregator.clone();
                let document = document.clone();
                let results = results.clone();
                async move { aggregator.aggregate(&document, &results).await }
            })
            .await
            .map_err(|failure| FailureRecord::from_task(&failure))?;

        info!("[文档 {}] ✓ 产物: {}", ctx.document_id(), artifact);
        Ok(StageOutput::Aggregated(artifact))
    }
}

fn new_execution_id() -> String {
    format!("exec-{}", uuid::Uuid::new_v4())
}

fn collect_section_results(
    sections: &[Section],
    results: Vec<Result<String, TaskFailure>>,
) -> Vec<SectionResult> {
    sections
        .iter()
        .zip(results)
        .map(|(section, result)| SectionResult {
            index: section.index,
            name: section.name.clone(),
            outcome: match result {
                Ok(summary) => SectionOutcome::Summarized(summary),
                Err(failure) => SectionOutcome::Failed(failure),
            },
        })
        .collect()
}

// ========== 日志辅助函数 ==========

fn log_execution_start(ctx: &ExecutionCtx) {
    info!("[文档 {}] 开始处理 (执行 {})", ctx.document_id(), ctx.execution_id());
    info!("[文档 {}] 位置: {}", ctx.document_id(), ctx.document().location);
}

fn log_execution_complete(ctx: &ExecutionCtx, outcome: &ExecutionOutcome, finished_at: DateTime<Utc>) {
    let elapsed_ms = (finished_at - ctx.started_at()).num_milliseconds();
    match outcome {
        ExecutionOutcome::Completed { artifact, .. } => info!(
            "[文档 {}] ✅ 处理完成: {} (耗时 {}ms)",
            ctx.document_id(),
            artifact,
            elapsed_ms
        ),
        ExecutionOutcome::Failed { failure, .. } => warn!(
            "[文档 {}] ❌ 处理失败于 {} 阶段 (耗时 {}ms)",
            ctx.document_id(),
            failure.stage,
            elapsed_ms
        ),
    }
}
