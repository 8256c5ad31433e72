//! # Doc Summary Flow
//!
//! 文档摘要工作流引擎：入站文档 → 类型校验 → 章节提取 → 并发摘要 → 汇总 → 通知
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 与业务无关的执行能力
//! - `TaskExecutor` - 超时 + 指数退避重试，按阶段配置尝试次数
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力都是一个 trait
//! - `SectionExtractor` - 从文档中切分有序章节
//! - `Summarizer` - 单个章节的摘要（LLM）
//! - `Aggregator` - 合并章节摘要并写出产物
//! - `NotificationTransport` - 投递终态通知（文件 / webhook）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文档"的完整状态机
//! - `ExecutionCtx` - 不可变的执行上下文
//! - `FanOut` - 受限并发扇出，结果按输入顺序返回
//! - `WorkflowEngine` - 驱动状态转移，每次执行恰好通知一次
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 扫描收件目录，控制文档级并发

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{FailureKind, FailureRecord, Stage, TaskError};
pub use infrastructure::TaskExecutor;
pub use models::{DocumentEvent, Section, SectionResult};
pub use orchestrator::{App, ProcessingStats};
pub use workflow::{
    Collaborators, ExecutionOutcome, ExecutionReport, FanOut, FanOutPolicy, WorkflowEngine,
    WorkflowState,
};
