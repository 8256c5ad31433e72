//! 任务执行器 - 基础设施层
//!
//! 对单次任务调用加上超时和重试，只暴露"执行一个阶段任务"的能力

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::{Config, RetryAttempts};
use crate::error::{Stage, TaskError, TaskFailure};

/// 单个阶段的重试策略
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次），0 视为 1
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// 第 `failed_attempts` 次失败之后的等待时间
    pub fn backoff_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// 任务执行器
///
/// 职责：
/// - 每次调用都带超时，超时按暂时性失败处理
/// - 暂时性失败按阶段策略退避重试，耗尽后升级为永久性失败
/// - 永久性失败立即返回，不重试
/// - 任务 panic 按永久性失败处理，不会穿透到调用方
/// - 不持有任何执行级状态，可以在多个文档之间共享
#[derive(Clone, Debug)]
pub struct TaskExecutor {
    timeout: Duration,
    attempts: RetryAttempts,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl TaskExecutor {
    pub fn new(
        timeout: Duration,
        attempts: RetryAttempts,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            timeout,
            attempts,
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.task_timeout(),
            config.retry.clone(),
            Duration::from_millis(config.retry_backoff_ms),
            Duration::from_millis(config.retry_max_backoff_ms),
        )
    }

    pub fn policy(&self, stage: Stage) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.attempts.for_stage(stage),
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
        }
    }

    /// 执行一个阶段任务
    ///
    /// `task` 每次尝试都会被重新调用，所以它必须自带完整输入
    pub async fn execute<T, F, Fut>(
        &self,
        stage: Stage,
        document_id: &str,
        mut task: F,
    ) -> Result<T, TaskFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        let policy = self.policy(stage);
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let guarded = AssertUnwindSafe(async { task().await }).catch_unwind();
            let result = match timeout(self.timeout, guarded).await {
                Ok(Ok(result)) => result,
                Ok(Err(payload)) => Err(TaskError::permanent(format!(
                    "任务 panic: {}",
                    panic_message(payload.as_ref())
                ))),
                Err(_) => Err(TaskError::timed_out(self.timeout)),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("[文档 {}] {} 第 {} 次尝试成功", document_id, stage, attempt);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = policy.backoff_for(attempt);
                    warn!(
                        "[文档 {}] {} 暂时性失败 (尝试 {}/{}): {}，{}ms 后重试...",
                        document_id,
                        stage,
                        attempt,
                        max_attempts,
                        err.cause(),
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    let error = match err {
                        TaskError::Transient(cause) => TaskError::Permanent(format!(
                            "重试 {} 次后仍失败: {}",
                            attempt, cause
                        )),
                        permanent => permanent,
                    };
                    return Err(TaskFailure {
                        stage,
                        document_id: document_id.to_string(),
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }
}

/// 取出 panic 载荷里的文字说明
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}
