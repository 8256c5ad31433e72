//! 章节提取服务 - 业务能力层
//!
//! 只负责"把文档切成有序章节"能力，不关心流程

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::TaskError;
use crate::models::{DocumentEvent, Section};

/// 提取协作方
#[async_trait]
pub trait SectionExtractor: Send + Sync {
    /// 返回按原文顺序排列的章节；没有章节时返回空列表而不是错误
    async fn extract(&self, document: &DocumentEvent) -> Result<Vec<Section>, TaskError>;
}

/// 短于该字符数的段落会被丢弃
const MIN_PARAGRAPH_CHARS: usize = 40;
/// 少于该词数的段落会被丢弃
const MIN_PARAGRAPH_WORDS: usize = 8;

/// 基于标题的章节提取器
///
/// 读取文档的文本层（PDF 用 `pdf-extract` 解码，其余按 UTF-8 文本读），
/// 按编号标题（`1 Introduction`、`2.1 Method`）切分，丢弃参考文献和附录。
pub struct TextSectionExtractor {
    header_number_join: Regex,
    page_number: Regex,
    footnote_marker: Regex,
    figure_caption: Regex,
    hyphen_break: Regex,
    inline_space: Regex,
    blank_lines: Regex,
    section_header: Regex,
    back_matter: Regex,
    sentence_end: Regex,
    trailing_number: Regex,
    whitespace: Regex,
}

impl TextSectionExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            header_number_join: Regex::new(r"\n+(\d+)\s*\n+([A-Z][A-Za-z0-9 \-\?]{3,})")?,
            page_number: Regex::new(r"(?m)^\s*\d+\s*$")?,
            footnote_marker: Regex::new(r"(\w\.)\d+(\s)")?,
            figure_caption: Regex::new(r"(?i)(Figure|Table)\s+\d+[.:].*?\n")?,
            hyphen_break: Regex::new(r"(\w+)-\n(\w+)")?,
            inline_space: Regex::new(r"[ \t]+")?,
            blank_lines: Regex::new(r"\n{3,}")?,
            section_header: Regex::new(
                r"^((\d{1,2}(\.\d{1,2})*\s+[A-Z][A-Za-z0-9 \-\?]{3,})|REFERENCES|References|APPENDIX(\s+[A-Z])?|Appendix(\s+[A-Z])?)$",
            )?,
            back_matter: Regex::new(r"^(REFERENCES|References|APPENDIX|Appendix)")?,
            sentence_end: Regex::new(r"[.!?]\s*$")?,
            trailing_number: Regex::new(r"\s+\d+$")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// 归一化换行、去页码/脚注/图表标题、合并断词
    pub fn clean_text(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let text = self.header_number_join.replace_all(&text, "\n${1} ${2}");
        let text = self.page_number.replace_all(&text, "");
        let text = self.footnote_marker.replace_all(&text, "${1}${2}");
        let text = self.figure_caption.replace_all(&text, "");
        let text = self.hyphen_break.replace_all(&text, "${1}${2}");
        let text = self.inline_space.replace_all(&text, " ");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        text.trim().to_string()
    }

    /// 从原始文本切出章节
    pub fn split_sections(&self, raw: &str) -> Vec<Section> {
        let cleaned = self.clean_text(raw);

        // 重复标题沿用第一次出现的位置，内容以最后一次为准
        let mut sections: Vec<(String, Vec<String>)> = Vec::new();
        let mut current: Option<String> = None;
        let mut paragraphs: Vec<String> = Vec::new();

        for line in cleaned.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if self.section_header.is_match(line) {
                if let Some(name) = current.take() {
                    store_section(&mut sections, name, std::mem::take(&mut paragraphs));
                }
                paragraphs.clear();
                current = Some(line.to_string());
                continue;
            }

            let starts_new_paragraph = match paragraphs.last() {
                Some(last) => {
                    line.split_whitespace().count() < 5
                        || (line.chars().count() > 100 && last.chars().count() > 100)
                }
                None => true,
            };
            match paragraphs.last_mut() {
                Some(last) if !starts_new_paragraph => {
                    last.push(' ');
                    last.push_str(line);
                }
                _ => paragraphs.push(line.to_string()),
            }
        }
        if let Some(name) = current {
            store_section(&mut sections, name, paragraphs);
        }

        sections
            .into_iter()
            .filter(|(name, _)| !self.back_matter.is_match(name))
            .map(|(name, paragraphs)| (name, self.merge_paragraphs(&paragraphs).join(" ")))
            .filter(|(_, text)| !text.is_empty())
            .enumerate()
            .map(|(index, (name, text))| Section::new(index, name, text))
            .collect()
    }

    /// 合并没有句末标点的碎片段落，丢弃过短的段落
    fn merge_paragraphs(&self, paragraphs: &[String]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut current = String::new();

        for para in paragraphs.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            if !current.is_empty() && !self.sentence_end.is_match(&current) {
                current.push(' ');
                current.push_str(para);
            } else {
                if !current.is_empty() {
                    merged.push(std::mem::take(&mut current));
                }
                current = para.to_string();
            }
        }
        if !current.is_empty() {
            merged.push(current);
        }

        merged
            .into_iter()
            .map(|para| {
                let para = self.trailing_number.replace(&para, "");
                self.whitespace.replace_all(&para, " ").trim().to_string()
            })
            .filter(|para| {
                para.chars().count() >= MIN_PARAGRAPH_CHARS
                    && para.split_whitespace().count() >= MIN_PARAGRAPH_WORDS
            })
            .collect()
    }
}

fn store_section(sections: &mut Vec<(String, Vec<String>)>, name: String, paragraphs: Vec<String>) {
    if paragraphs.is_empty() {
        return;
    }
    match sections.iter_mut().find(|(existing, _)| *existing == name) {
        Some(slot) => slot.1 = paragraphs,
        None => sections.push((name, paragraphs)),
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";

/// 取出文档的文本层
///
/// 以 `%PDF-` 开头的内容交给 `pdf-extract`，解析在阻塞线程池里进行；
/// 解析失败或解析器 panic 都算永久失败，重试不会改变结果。
pub async fn decode_text_layer(bytes: Vec<u8>) -> Result<String, TaskError> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    let decoded = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| TaskError::permanent(format!("PDF 解析任务异常: {}", e)))?;
    decoded.map_err(|e| TaskError::permanent(format!("PDF 文本层解析失败: {:?}", e)))
}

#[async_trait]
impl SectionExtractor for TextSectionExtractor {
    async fn extract(&self, document: &DocumentEvent) -> Result<Vec<Section>, TaskError> {
        let path = document.local_path();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                TaskError::permanent(format!("无法读取文档 {}: {}", path, e))
            }
            _ => TaskError::transient(format!("读取文档 {} 失败: {}", path, e)),
        })?;

        let byte_len = bytes.len();
        let raw = decode_text_layer(bytes).await?;
        let sections = self.split_sections(&raw);
        debug!(
            "[文档 {}] 提取到 {} 个章节 (原文 {} 字节)",
            document.document_id,
            sections.len(),
            byte_len
        );
        Ok(sections)
    }
}
