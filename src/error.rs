use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// 工作流阶段
///
/// 用于标记失败发生在哪个阶段，通知消息会原样引用这里的名字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Extract,
    Summarize,
    Aggregate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "Validate",
            Stage::Extract => "Extract",
            Stage::Summarize => "Summarize",
            Stage::Aggregate => "Aggregate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次任务调用的错误（由协作方返回）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// 暂时性失败：超时、资源耗尽等，可以重试
    #[error("暂时性失败: {0}")]
    Transient(String),
    /// 永久性失败：输入非法、不可恢复，不重试
    #[error("永久性失败: {0}")]
    Permanent(String),
}

impl TaskError {
    pub fn transient(cause: impl Into<String>) -> Self {
        TaskError::Transient(cause.into())
    }

    pub fn permanent(cause: impl Into<String>) -> Self {
        TaskError::Permanent(cause.into())
    }

    /// 超时一律视为暂时性失败
    pub fn timed_out(limit: Duration) -> Self {
        TaskError::Transient(format!("任务超时 ({}ms)", limit.as_millis()))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, TaskError::Transient(_))
    }

    /// 失败原因（不带前缀）
    pub fn cause(&self) -> &str {
        match self {
            TaskError::Transient(cause) | TaskError::Permanent(cause) => cause,
        }
    }
}

/// 任务执行器最终返回的失败
///
/// 暂时性失败重试耗尽后会被升级为永久性失败，所以这里的 `error` 总是
/// 不可再重试的。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{document_id}] {stage} 阶段失败 (尝试 {attempts} 次): {error}")]
pub struct TaskFailure {
    pub stage: Stage,
    pub document_id: String,
    pub attempts: u32,
    pub error: TaskError,
}

impl TaskFailure {
    pub fn cause(&self) -> &str {
        self.error.cause()
    }
}

/// 失败类别（终态通知用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 文件类型不对、提取结果为空
    Validation,
    /// 任务永久失败（含重试耗尽）
    PermanentTask,
    /// 汇总失败
    Aggregation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "ValidationFailure"),
            FailureKind::PermanentTask => write!(f, "PermanentTaskFailure"),
            FailureKind::Aggregation => write!(f, "AggregationFailure"),
        }
    }
}

/// 失败记录
///
/// 在执行上下文里一直携带到 NotifyFailure 终态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub stage: Stage,
    pub kind: FailureKind,
    pub cause: String,
    pub document_id: String,
}

impl FailureRecord {
    pub fn validation(stage: Stage, document_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Validation,
            cause: cause.into(),
            document_id: document_id.into(),
        }
    }

    /// 从任务失败转换，汇总阶段单独归类
    pub fn from_task(failure: &TaskFailure) -> Self {
        let kind = match failure.stage {
            Stage::Aggregate => FailureKind::Aggregation,
            _ => FailureKind::PermanentTask,
        };
        Self {
            stage: failure.stage,
            kind,
            cause: failure.cause().to_string(),
            document_id: failure.document_id.clone(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) 阶段 {}: {}",
            self.document_id, self.kind, self.stage, self.cause
        )
    }
}

/// 通知投递错误
///
/// 不能再走工作流的失败分支（否则会无限递归），只能交给调用方/运维
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 传输层无法发出
    #[error("通知投递失败 (收件方: {recipient}): {source}")]
    Transport {
        recipient: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 传输层拒收
    #[error("通知被拒收 (收件方: {recipient}): {reason}")]
    Rejected { recipient: String, reason: String },
}

impl NotifyError {
    pub fn transport(
        recipient: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        NotifyError::Transport {
            recipient: recipient.into(),
            source: Box::new(source),
        }
    }

    pub fn rejected(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        NotifyError::Rejected {
            recipient: recipient.into(),
            reason: reason.into(),
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 取值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
