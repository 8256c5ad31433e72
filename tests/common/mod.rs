//! 集成测试共用的协作方替身
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use doc_summary_flow::config::RetryAttempts;
use doc_summary_flow::error::{NotifyError, TaskError};
use doc_summary_flow::models::{ArtifactRef, DocumentEvent, Section, SectionResult};
use doc_summary_flow::services::{
    Aggregator, DeliveryReceipt, NotificationMessage, NotificationTransport, SectionExtractor,
    Summarizer,
};
use doc_summary_flow::workflow::{Collaborators, FanOutPolicy, WorkflowEngine};
use doc_summary_flow::{Config, TaskExecutor};

/// 按文档 ID 返回预设章节
#[derive(Default)]
pub struct MockExtractor {
    sections: HashMap<String, Vec<Section>>,
    transient_failures: AtomicUsize,
    panics: bool,
    pub calls: AtomicUsize,
}

impl MockExtractor {
    pub fn with_document(mut self, document_id: &str, names: &[&str]) -> Self {
        let sections = names
            .iter()
            .enumerate()
            .map(|(i, name)| Section::new(i, *name, format!("{} text", name)))
            .collect();
        self.sections.insert(document_id.to_string(), sections);
        self
    }

    /// 每次调用都 panic
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// 前 n 次调用返回暂时性错误
    pub fn failing_first(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl SectionExtractor for MockExtractor {
    async fn extract(&self, document: &DocumentEvent) -> Result<Vec<Section>, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("text layer corrupted");
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TaskError::transient("存储暂时不可用"));
        }
        Ok(self
            .sections
            .get(&document.document_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// 文本中含 `fail` 的章节永久失败，含 `flaky` 的章节第一次暂时性失败，
/// 含 `panic` 的章节直接 panic
#[derive(Default)]
pub struct MockSummarizer {
    delay: Duration,
    pub calls: AtomicUsize,
    flaky_seen: AtomicUsize,
    in_flight: AtomicUsize,
    pub high_water: AtomicUsize,
}

impl MockSummarizer {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if text.contains("panic") {
            panic!("model crashed");
        }

        let result = if text.contains("fail") {
            Err(TaskError::permanent(format!("无法摘要: {}", text)))
        } else if text.contains("flaky") && self.flaky_seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(TaskError::transient("限流"))
        } else {
            Ok(format!("summary of {}", text))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// 记录收到的章节结果，返回 `out/<stem>.summary`
#[derive(Default)]
pub struct MockAggregator {
    pub calls: AtomicUsize,
    pub received: Mutex<Vec<SectionResult>>,
}

#[async_trait]
impl Aggregator for MockAggregator {
    async fn aggregate(
        &self,
        document: &DocumentEvent,
        results: &[SectionResult],
    ) -> Result<ArtifactRef, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.received.lock().unwrap() = results.to_vec();
        let stem = Path::new(&document.document_id)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        Ok(ArtifactRef(format!("out/{}.summary", stem)))
    }
}

/// 记录每一条通知，可配置为拒绝投递
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, NotificationMessage)>>,
    reject: bool,
}

impl RecordingTransport {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn count_for(&self, document_id: &str) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.subject.ends_with(document_id))
            .count()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(
        &self,
        message: &NotificationMessage,
        recipient: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.clone()));
        if self.reject {
            return Err(NotifyError::rejected(recipient, "mailbox full"));
        }
        Ok(DeliveryReceipt::now(recipient))
    }
}

pub struct Harness {
    pub extractor: Arc<MockExtractor>,
    pub summarizer: Arc<MockSummarizer>,
    pub aggregator: Arc<MockAggregator>,
    pub transport: Arc<RecordingTransport>,
    pub engine: Arc<WorkflowEngine>,
}

pub fn test_config(policy: FanOutPolicy) -> Config {
    Config {
        max_concurrency: 2,
        section_failure_policy: policy,
        ..Config::default()
    }
}

/// 毫秒级超时和退避
pub fn fast_executor() -> TaskExecutor {
    TaskExecutor::new(
        Duration::from_millis(500),
        RetryAttempts::default(),
        Duration::from_millis(1),
        Duration::from_millis(5),
    )
}

pub fn harness(
    config: &Config,
    extractor: MockExtractor,
    summarizer: MockSummarizer,
    transport: RecordingTransport,
) -> Harness {
    let extractor = Arc::new(extractor);
    let summarizer = Arc::new(summarizer);
    let aggregator = Arc::new(MockAggregator::default());
    let transport = Arc::new(transport);

    let collaborators = Collaborators {
        extractor: extractor.clone(),
        summarizer: summarizer.clone(),
        aggregator: aggregator.clone(),
        transport: transport.clone(),
    };
    let engine = Arc::new(WorkflowEngine::new(config, collaborators).with_executor(fast_executor()));

    Harness {
        extractor,
        summarizer,
        aggregator,
        transport,
        engine,
    }
}

pub fn event(document_id: &str) -> DocumentEvent {
    DocumentEvent::new(document_id, format!("inbox/{}", document_id))
}
