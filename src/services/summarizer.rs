//! 摘要服务 - 业务能力层
//!
//! 只负责"把一段文本压缩成摘要"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型（兼容 OpenAI API 的服务均可）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::TaskError;

/// 摘要协作方
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, TaskError>;
}

const SYSTEM_PROMPT: &str = "You are a precise technical summarizer. \
    Summarize the given passage in a few sentences, keeping key facts and terminology. \
    Reply with the summary only.";

/// 基于 LLM 的摘要服务
///
/// 职责：
/// - 拒绝空文本（永久性失败）
/// - 长文本按句子切成不超过 `chunk_words` 词的分块，并发摘要后按顺序拼接
/// - 网络/API 错误按暂时性失败返回，由任务执行器决定是否重试
pub struct LlmSummarizer {
    client: Client<OpenAIConfig>,
    model_name: String,
    chunk_words: usize,
    sentence_break: Regex,
}

impl LlmSummarizer {
    pub fn new(config: &Config) -> Result<Self, regex::Error> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Ok(Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            chunk_words: config.summary_chunk_words.max(1),
            sentence_break: Regex::new(r"[.!?]\s+")?,
        })
    }

    /// 按句子边界切块，每块不超过 `chunk_words` 个词（单句超长时单独成块）
    pub fn split_into_chunks(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;
        for m in self.sentence_break.find_iter(text) {
            // 保留句末标点
            sentences.push(&text[start..m.start() + 1]);
            start = m.end();
        }
        if start < text.len() {
            sentences.push(&text[start..]);
        }

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_words = 0;

        for sentence in sentences {
            let words = sentence.split_whitespace().count();
            if current_words + words > self.chunk_words && !current.is_empty() {
                chunks.push(current.join(" ").trim().to_string());
                current.clear();
                current_words = 0;
            }
            current.push(sentence);
            current_words += words;
        }
        if !current.is_empty() {
            chunks.push(current.join(" ").trim().to_string());
        }
        chunks.retain(|chunk| !chunk.is_empty());
        chunks
    }

    /// 调用一次 LLM，摘要单个分块
    async fn send_to_llm(&self, chunk: &str) -> Result<String, TaskError> {
        debug!("调用 LLM API，模型: {}，分块长度: {} 字符", self.model_name, chunk.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|e| TaskError::permanent(format!("构建系统消息失败: {}", e)))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(chunk)
            .build()
            .map_err(|e| TaskError::permanent(format!("构建用户消息失败: {}", e)))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.3)
            .max_tokens(512u32)
            .build()
            .map_err(|e| TaskError::permanent(format!("构建请求失败: {}", e)))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            TaskError::transient(format!("LLM API 调用失败: {}", e))
        })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| TaskError::transient("LLM 返回内容为空"))
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, TaskError> {
        if text.trim().is_empty() {
            return Err(TaskError::permanent("章节文本为空"));
        }

        let chunks = self.split_into_chunks(text);
        let results = join_all(chunks.iter().map(|chunk| self.send_to_llm(chunk))).await;

        let mut summaries = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (idx, result) in results.into_iter().enumerate() {
            match result {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    warn!("分块 {} 摘要失败: {}", idx, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        // 部分分块失败时丢弃失败的分块；全部失败才算失败
        match (summaries.is_empty(), first_error) {
            (true, Some(err)) => Err(err),
            (true, None) => Err(TaskError::permanent("没有可摘要的内容")),
            (false, _) => Ok(summaries.join(" ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service(chunk_words: usize) -> LlmSummarizer {
        let config = Config {
            summary_chunk_words: chunk_words,
            ..Config::default()
        };
        LlmSummarizer::new(&config).unwrap()
    }

    #[test]
    fn test_split_into_chunks_respects_word_budget() {
        let service = create_test_service(6);
        let chunks = service.split_into_chunks("One two three. Four five six! Seven eight? Nine.");
        assert_eq!(
            chunks,
            vec!["One two three. Four five six!", "Seven eight? Nine."]
        );
    }

    #[test]
    fn test_long_single_sentence_stays_one_chunk() {
        let service = create_test_service(2);
        let chunks = service.split_into_chunks("a very long sentence without a break");
        assert_eq!(chunks, vec!["a very long sentence without a break"]);
    }

    #[tokio::test]
    async fn test_blank_text_is_permanent_failure() {
        let service = create_test_service(512);
        let err = service.summarize("   \n ").await.unwrap_err();
        assert_eq!(err, TaskError::permanent("章节文本为空"));
    }

    /// 运行方式：`LLM_API_KEY=... cargo test test_summarize_live -- --ignored --nocapture`
    #[tokio::test]
    #[ignore]
    async fn test_summarize_live() {
        let _ = tracing_subscriber::fmt::try_init();
        let config = Config::from_env().unwrap();
        let service = LlmSummarizer::new(&config).unwrap();

        let summary = service
            .summarize(
                "The orchestration engine validates the file type, extracts ordered sections, \
                 summarizes them in parallel under a concurrency limit and aggregates the results.",
            )
            .await
            .unwrap();

        println!("摘要: {}", summary);
        assert!(!summary.is_empty());
    }
}
