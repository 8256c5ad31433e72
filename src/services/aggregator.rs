//! 汇总服务 - 业务能力层
//!
//! 只负责"把有序的章节摘要写成最终产物"能力

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::TaskError;
use crate::models::{ArtifactRef, DocumentEvent, SectionResult};

/// 汇总协作方，同时负责把产物持久化
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn aggregate(
        &self,
        document: &DocumentEvent,
        results: &[SectionResult],
    ) -> Result<ArtifactRef, TaskError>;
}

/// 写本地文件的汇总服务
///
/// 产物路径为 `<output_dir>/<文件名去扩展名>.summary`，失败的章节会被跳过
pub struct FileAggregator {
    output_dir: PathBuf,
}

impl FileAggregator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_path(&self, document: &DocumentEvent) -> PathBuf {
        let stem = Path::new(&document.document_id)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(&document.document_id);
        self.output_dir.join(format!("{}.summary", stem))
    }

    /// 渲染产物内容：每个成功的章节一个标题 + 摘要
    pub fn render(document: &DocumentEvent, results: &[SectionResult]) -> String {
        let mut content = format!("# {}\n", document.document_id);
        for result in results {
            if let Some(summary) = result.summary() {
                content.push_str(&format!("\n## {}\n\n{}\n", result.name, summary));
            }
        }
        content
    }
}

#[async_trait]
impl Aggregator for FileAggregator {
    async fn aggregate(
        &self,
        document: &DocumentEvent,
        results: &[SectionResult],
    ) -> Result<ArtifactRef, TaskError> {
        if results.iter().all(|r| r.is_failed()) {
            return Err(TaskError::permanent("没有成功摘要的章节可以汇总"));
        }

        let path = self.output_path(document);
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| TaskError::transient(format!("无法创建输出目录: {}", e)))?;
        tokio::fs::write(&path, Self::render(document, results))
            .await
            .map_err(|e| TaskError::transient(format!("写入 {} 失败: {}", path.display(), e)))?;

        debug!("[文档 {}] 产物已写入: {}", document.document_id, path.display());
        Ok(ArtifactRef(path.to_string_lossy().to_string()))
    }
}
