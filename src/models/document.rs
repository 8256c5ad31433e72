use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TaskFailure;

/// 入站事件：一个待处理的文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvent {
    /// 文档标识（通常是文件名，如 `report.pdf`）
    pub document_id: String,
    /// 存储位置（本地路径或 `file://` URI）
    pub location: String,
}

impl DocumentEvent {
    pub fn new(document_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            location: location.into(),
        }
    }

    /// 只按扩展名判断，不看内容；大小写不敏感
    ///
    /// `accepted` 可以带或不带前导点（`.pdf` / `pdf`）
    pub fn has_extension(&self, accepted: &str) -> bool {
        let accepted = accepted.trim_start_matches('.');
        Path::new(&self.document_id)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(accepted))
            .unwrap_or(false)
    }

    /// 去掉 `file://` 前缀后的本地路径
    pub fn local_path(&self) -> &str {
        self.location
            .strip_prefix("file://")
            .unwrap_or(&self.location)
    }
}

/// 文档中的一个章节，提取后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// 在原文中的位置（从 0 开始）
    pub index: usize,
    pub name: String,
    pub text: String,
}

impl Section {
    pub fn new(index: usize, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            text: text.into(),
        }
    }
}

/// 单个章节的摘要结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionOutcome {
    Summarized(String),
    Failed(TaskFailure),
}

/// 摘要结果，按原章节位置索引
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionResult {
    pub index: usize,
    pub name: String,
    pub outcome: SectionOutcome,
}

impl SectionResult {
    pub fn summary(&self) -> Option<&str> {
        match &self.outcome {
            SectionOutcome::Summarized(summary) => Some(summary),
            SectionOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SectionOutcome::Failed(_))
    }
}

/// 汇总产物的引用（输出位置）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let event = DocumentEvent::new("REPORT.PDF", "inbox/REPORT.PDF");
        assert!(event.has_extension(".pdf"));
        assert!(event.has_extension("pdf"));
    }

    #[test]
    fn test_extension_mismatch() {
        assert!(!DocumentEvent::new("report.docx", "x").has_extension(".pdf"));
        assert!(!DocumentEvent::new("pdf", "x").has_extension(".pdf"));
        assert!(!DocumentEvent::new("report.pdf.png", "x").has_extension(".pdf"));
    }

    #[test]
    fn test_local_path_strips_file_scheme() {
        let event = DocumentEvent::new("a.pdf", "file:///tmp/a.pdf");
        assert_eq!(event.local_path(), "/tmp/a.pdf");
    }
}
