use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Stage};
use crate::workflow::FanOutPolicy;

/// 各阶段的最大尝试次数（含第一次）
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryAttempts {
    pub extract: u32,
    pub summarize: u32,
    pub aggregate: u32,
}

impl Default for RetryAttempts {
    fn default() -> Self {
        Self {
            extract: 2,
            summarize: 3,
            aggregate: 2,
        }
    }
}

impl RetryAttempts {
    /// 校验阶段本身不调用协作方，固定一次
    pub fn for_stage(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Validate => 1,
            Stage::Extract => self.extract,
            Stage::Summarize => self.summarize,
            Stage::Aggregate => self.aggregate,
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 单个文档内同时摘要的章节数
    pub max_concurrency: usize,
    /// 同时处理的文档数量
    pub max_concurrent_documents: usize,
    /// 接受的文件扩展名（不区分大小写）
    pub accepted_file_extension: String,
    /// 单次任务调用超时（秒）
    pub task_timeout_secs: u64,
    pub retry: RetryAttempts,
    /// 首次重试前的等待（毫秒），之后指数增长
    pub retry_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    /// 章节摘要失败时的处理策略
    pub section_failure_policy: FanOutPolicy,
    // --- 通知 ---
    pub notification_recipient: String,
    pub notification_log_file: String,
    /// 设置后改用 webhook 投递
    pub notification_webhook_url: Option<String>,
    // --- 输入输出 ---
    pub inbox_folder: String,
    pub output_dir: String,
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 每个摘要分块的最大词数
    pub summary_chunk_words: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_concurrent_documents: 4,
            accepted_file_extension: ".pdf".to_string(),
            task_timeout_secs: 120,
            retry: RetryAttempts::default(),
            retry_backoff_ms: 500,
            retry_max_backoff_ms: 10_000,
            section_failure_policy: FanOutPolicy::BestEffort,
            notification_recipient: "document-summaries".to_string(),
            notification_log_file: "notifications.log".to_string(),
            notification_webhook_url: None,
            inbox_folder: "inbox".to_string(),
            output_dir: "out".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            summary_chunk_words: 512,
        }
    }
}

impl Config {
    /// 默认值 + 环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，未出现的字段取默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 启动时使用：`CONFIG_FILE`（若设置）→ 环境变量覆盖 → 校验
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        override_parsed("MAX_CONCURRENCY", &mut self.max_concurrency)?;
        override_parsed("MAX_CONCURRENT_DOCUMENTS", &mut self.max_concurrent_documents)?;
        override_string("ACCEPTED_FILE_EXTENSION", &mut self.accepted_file_extension);
        override_parsed("TASK_TIMEOUT_SECONDS", &mut self.task_timeout_secs)?;
        override_parsed("RETRY_ATTEMPTS_EXTRACT", &mut self.retry.extract)?;
        override_parsed("RETRY_ATTEMPTS_SUMMARIZE", &mut self.retry.summarize)?;
        override_parsed("RETRY_ATTEMPTS_AGGREGATE", &mut self.retry.aggregate)?;
        override_parsed("RETRY_BACKOFF_MS", &mut self.retry_backoff_ms)?;
        override_parsed("RETRY_MAX_BACKOFF_MS", &mut self.retry_max_backoff_ms)?;
        override_parsed("SECTION_FAILURE_POLICY", &mut self.section_failure_policy)?;
        override_string("NOTIFICATION_RECIPIENT", &mut self.notification_recipient);
        override_string("NOTIFICATION_LOG_FILE", &mut self.notification_log_file);
        if let Ok(url) = std::env::var("NOTIFICATION_WEBHOOK_URL") {
            self.notification_webhook_url = Some(url).filter(|u| !u.is_empty());
        }
        override_string("INBOX_FOLDER", &mut self.inbox_folder);
        override_string("OUTPUT_DIR", &mut self.output_dir);
        override_string("OUTPUT_LOG_FILE", &mut self.output_log_file);
        override_parsed("VERBOSE_LOGGING", &mut self.verbose_logging)?;
        override_string("LLM_API_KEY", &mut self.llm_api_key);
        override_string("LLM_API_BASE_URL", &mut self.llm_api_base_url);
        override_string("LLM_MODEL_NAME", &mut self.llm_model_name);
        override_parsed("SUMMARY_CHUNK_WORDS", &mut self.summary_chunk_words)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "必须大于 0"));
        }
        if self.max_concurrent_documents == 0 {
            return Err(ConfigError::invalid("max_concurrent_documents", "必须大于 0"));
        }
        if self.task_timeout_secs == 0 {
            return Err(ConfigError::invalid("task_timeout_secs", "必须大于 0"));
        }
        if self.accepted_file_extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::invalid("accepted_file_extension", "不能为空"));
        }
        if self.summary_chunk_words == 0 {
            return Err(ConfigError::invalid("summary_chunk_words", "必须大于 0"));
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

fn override_string(var_name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var_name) {
        *target = value;
    }
}

fn override_parsed<T: FromStr>(var_name: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(var_name) {
        *target = value
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                expected_type: std::any::type_name::<T>().to_string(),
                value,
            })?;
    }
    Ok(())
}
