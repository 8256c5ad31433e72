//! 扇出协调器 - 流程层
//!
//! 把一组有序输入分发给并发受限的 worker，再按原始顺序收回结果。
//!
//! ## 核心保证
//!
//! 1. 同时运行的 worker 数量永远不超过 `max_concurrency`
//! 2. 输出第 i 项永远对应输入第 i 项，与完成顺序无关
//! 3. 每次调用自带信号量，不同文档之间没有共享状态
//! 4. fail-fast 下第一个失败出现后立刻取消尚未开始和正在运行的任务
//! 5. worker panic 只让对应的那一项失败，不会传播给调用方

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::infrastructure::panic_message;

/// 部分失败时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutPolicy {
    /// 任意一项失败就取消其余任务，立即返回该失败
    FailFast,
    /// 所有任务各自完成或失败，全部结果交给调用方
    #[default]
    BestEffort,
}

impl FromStr for FanOutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" => Ok(FanOutPolicy::FailFast),
            "best_effort" | "best-effort" => Ok(FanOutPolicy::BestEffort),
            other => Err(format!("未知的扇出策略: {}", other)),
        }
    }
}

/// 扇出结果
#[derive(Debug)]
pub enum FanOutOutcome<T, E> {
    /// 所有任务都已结束，`results[i]` 对应输入第 i 项
    Completed(Vec<Result<T, E>>),
    /// fail-fast 触发
    Aborted {
        failed_index: usize,
        error: E,
        /// 取消前已经成功的结果（按索引升序）
        completed: Vec<(usize, T)>,
    },
}

/// 扇出协调器
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    max_concurrency: usize,
    policy: FanOutPolicy,
}

impl FanOut {
    pub fn new(max_concurrency: usize, policy: FanOutPolicy) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            policy,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn policy(&self) -> FanOutPolicy {
        self.policy
    }

    /// 对每个输入调用一次 `worker(index, item)`
    ///
    /// worker panic 或没能返回结果时，用 `on_lost` 把该项变成失败，
    /// 输出长度永远等于输入长度。
    pub async fn run<I, T, E, W, Fut, L>(
        &self,
        items: Vec<I>,
        worker: W,
        on_lost: L,
    ) -> FanOutOutcome<T, E>
    where
        I: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        W: Fn(usize, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        L: Fn(WorkerLost) -> E,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let aborted = Arc::new(AtomicBool::new(false));
        let worker = Arc::new(worker);
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let aborted = aborted.clone();
            let worker = worker.clone();

            tasks.spawn(async move {
                // 信号量被关闭说明已经 abort
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, Slot::Skipped);
                };
                if aborted.load(Ordering::SeqCst) {
                    return (index, Slot::Skipped);
                }
                match AssertUnwindSafe(async { worker(index, item).await })
                    .catch_unwind()
                    .await
                {
                    Ok(result) => (index, Slot::Done(result)),
                    Err(payload) => (index, Slot::Panicked(panic_message(payload.as_ref()))),
                }
            });
        }

        let mut slots: Vec<Option<Result<T, E>>> = (0..total).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok((index, Slot::Done(result))) => (index, result),
                Ok((index, Slot::Panicked(reason))) => {
                    warn!("扇出第 {} 项 worker panic: {}", index, reason);
                    (index, Err(on_lost(WorkerLost { index, reason })))
                }
                Ok((_, Slot::Skipped)) | Err(_) => continue,
            };

            match result {
                Err(error) if self.policy == FanOutPolicy::FailFast => {
                    aborted.store(true, Ordering::SeqCst);
                    semaphore.close();
                    tasks.abort_all();
                    debug!("扇出在第 {} 项失败，取消剩余任务", index);

                    let completed = slots
                        .into_iter()
                        .enumerate()
                        .filter_map(|(i, slot)| match slot {
                            Some(Ok(value)) => Some((i, value)),
                            _ => None,
                        })
                        .collect();
                    return FanOutOutcome::Aborted {
                        failed_index: index,
                        error,
                        completed,
                    };
                }
                result => slots[index] = Some(result),
            }
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    Err(on_lost(WorkerLost {
                        index,
                        reason: "任务在返回结果前被取消".to_string(),
                    }))
                })
            })
            .collect();
        FanOutOutcome::Completed(results)
    }
}

/// 没有正常返回结果的 worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLost {
    pub index: usize,
    pub reason: String,
}

enum Slot<T, E> {
    Skipped,
    Done(Result<T, E>),
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("fail-fast".parse::<FanOutPolicy>(), Ok(FanOutPolicy::FailFast));
        assert_eq!("BEST_EFFORT".parse::<FanOutPolicy>(), Ok(FanOutPolicy::BestEffort));
        assert!("sometimes".parse::<FanOutPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_empty_input_completes_empty() {
        let outcome = FanOut::new(3, FanOutPolicy::FailFast)
            .run(Vec::<u32>::new(), |_, n| async move { Ok::<_, ()>(n) }, |_| ())
            .await;
        assert!(matches!(outcome, FanOutOutcome::Completed(ref r) if r.is_empty()));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped_to_one() {
        let fan_out = FanOut::new(0, FanOutPolicy::BestEffort);
        assert_eq!(fan_out.max_concurrency(), 1);
        let outcome = fan_out
            .run(vec![1, 2], |_, n| async move { Ok::<_, ()>(n * 2) }, |_| ())
            .await;
        match outcome {
            FanOutOutcome::Completed(results) => assert_eq!(results, vec![Ok(2), Ok(4)]),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
