use crate::models::document::DocumentEvent;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

/// 扫描收件目录，每个普通文件生成一个入站事件
///
/// 不在这里过滤扩展名：文件类型校验属于工作流的第一个状态，
/// 被拒绝的文件同样需要收到失败通知。
pub async fn load_inbox_events(folder_path: &str) -> Result<Vec<DocumentEvent>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut events = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(document_id) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!("跳过无法识别的文件名: {}", path.display());
            continue;
        };
        tracing::info!("发现文档: {}", document_id);
        events.push(DocumentEvent::new(
            document_id,
            path.to_string_lossy().to_string(),
        ));
    }

    // read_dir 顺序依赖平台
    events.sort_by(|a, b| a.document_id.cmp(&b.document_id));
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_file_becomes_an_event() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), "x").unwrap();
        std::fs::write(dir.path().join("a.png"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let events = load_inbox_events(dir.path().to_str().unwrap()).await.unwrap();

        let ids: Vec<_> = events.iter().map(|e| e.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a.png", "b.pdf"]);
        assert!(events[1].location.ends_with("b.pdf"));
    }

    #[tokio::test]
    async fn test_missing_folder_is_an_error() {
        assert!(load_inbox_events("/definitely/not/here").await.is_err());
    }
}
