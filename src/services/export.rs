use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::error::{AppError, Result};
use crate::services::gateway::ApiClient;

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    JsonLd,
    Html,
    Markdown,
    Csv,
    Word,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::JsonLd,
        ExportFormat::Html,
        ExportFormat::Markdown,
        ExportFormat::Csv,
        ExportFormat::Word,
    ];

    /// `/export/{id}/{segment}`
    pub fn path_segment(self) -> &'static str {
        match self {
            ExportFormat::JsonLd => "jsonld",
            ExportFormat::Html => "html",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Csv => "csv",
            ExportFormat::Word => "word",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::JsonLd => "jsonld",
            ExportFormat::Html => "html",
            ExportFormat::Markdown => "md",
            ExportFormat::Csv => "csv",
            ExportFormat::Word => "docx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::JsonLd => "application/json",
            ExportFormat::Html => "text/html",
            ExportFormat::Markdown => "text/plain",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Word => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    pub fn file_name(self, content_id: i64) -> String {
        format!("content-{}.{}", content_id, self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsonld" | "json-ld" => Ok(ExportFormat::JsonLd),
            "html" => Ok(ExportFormat::Html),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "csv" => Ok(ExportFormat::Csv),
            "word" | "docx" => Ok(ExportFormat::Word),
            other => Err(AppError::validation(&format!("不支持的导出格式: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ExportFile {
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let target = dir.join(&self.file_name);
        tokio::fs::write(&target, &self.bytes).await?;
        info!("Saved {} ({} bytes)", target.display(), self.bytes.len());
        Ok(target)
    }
}

#[derive(Clone)]
pub struct ExportService {
    client: ApiClient,
}

impl ExportService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// 服务端未给出类型或文件名时按格式补齐
    pub async fn download(&self, content_id: i64, format: ExportFormat) -> Result<ExportFile> {
        let download = self
            .client
            .download(&format!("/export/{}/{}", content_id, format.path_segment()))
            .await?;

        Ok(ExportFile {
            file_name: download
                .file_name
                .unwrap_or_else(|| format.file_name(content_id)),
            content_type: download
                .content_type
                .unwrap_or_else(|| format.content_type().to_string()),
            bytes: download.bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::routes::HistoryNavigator;
    use crate::services::session::Session;
    use crate::utils::notice::MemoryNotifier;
    use crate::utils::token_store::MemoryTokenStore;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_format_names() {
        assert_eq!(ExportFormat::Markdown.file_name(7), "content-7.md");
        assert_eq!(ExportFormat::Word.file_name(7), "content-7.docx");
        assert_eq!("JSON-LD".parse::<ExportFormat>().unwrap(), ExportFormat::JsonLd);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn test_download_and_save() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export/3/markdown"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"# \xe6\x8a\xa5\xe5\x91\x8a\n".to_vec()))
            .mount(&server)
            .await;

        let session = Session::new(Arc::new(MemoryTokenStore::new()), "token");
        let client = ApiClient::new(
            &Config::with_base_url(server.uri()),
            session,
            Arc::new(HistoryNavigator::default()),
            Arc::new(MemoryNotifier::new()),
        )
        .unwrap();
        let export = ExportService::new(client);

        let file = export.download(3, ExportFormat::Markdown).await.unwrap();
        assert_eq!(file.file_name, "content-3.md");

        let dir = tempfile::tempdir().unwrap();
        let saved = file.save_to(dir.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(saved).unwrap(), "# 报告\n");
    }
}
