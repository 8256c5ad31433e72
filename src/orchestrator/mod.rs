//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量提交和资源调度，是整个系统的"指挥中心"。
//!
//! ### `batch_processor` - 收件箱批处理器
//! - 组装协作方并创建工作流引擎
//! - 扫描收件目录（Vec<DocumentEvent>）
//! - 控制同时执行的文档数量（Semaphore）
//! - 输出全局统计信息，上报通知投递失败
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<DocumentEvent>)
//!     ↓
//! workflow::WorkflowEngine (处理单个文档)
//!     ↓
//! services (能力层：extract / summarize / aggregate / notify)
//!     ↓
//! infrastructure (基础设施：TaskExecutor)
//! ```

pub mod batch_processor;

pub use batch_processor::{App, ProcessingStats};
