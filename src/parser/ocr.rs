use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

use super::Block;
use crate::config::OcrConfig;
use crate::utils::{PackError, PackResult};

/// 图片文字识别引擎
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8], languages: &str) -> PackResult<String>;
}

/// 调用本机 tesseract 命令行
pub struct TesseractRecognizer {
    binary: String,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &[u8], languages: &str) -> PackResult<String> {
        let input = tempfile::Builder::new()
            .prefix("ocr_")
            .tempfile()
            .map_err(|e| PackError::Storage(format!("无法创建OCR临时文件: {}", e)))?;
        tokio::fs::write(input.path(), image)
            .await
            .map_err(|e| PackError::Storage(format!("写入OCR临时文件失败: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(languages)
            .output()
            .await
            .map_err(|e| PackError::Extraction(format!("无法启动 {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(PackError::Extraction(format!(
                "tesseract 退出码 {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .replace('\x0c', "")
            .trim_end()
            .to_string())
    }
}

pub struct OcrExtractor {
    recognizer: Arc<dyn TextRecognizer>,
    languages: String,
    concurrency: usize,
}

impl OcrExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, config: &OcrConfig) -> Self {
        Self {
            recognizer,
            languages: config.languages.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// 逐张识别，结果顺序与输入一致；最多同时运行 `concurrency` 个识别任务
    pub async fn recognize_all(&self, images: &[Vec<u8>]) -> Vec<PackResult<String>> {
        stream::iter(images.to_vec())
            .map(|image| {
                let recognizer = Arc::clone(&self.recognizer);
                let languages = self.languages.clone();
                async move { recognizer.recognize(&image, &languages).await }
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// 把全部识别结果用换行拼成一个段落。失败的图片贡献空字符串；全部为空时返回 None。
    pub async fn extract(&self, images: &[Vec<u8>]) -> Option<Block> {
        if images.is_empty() {
            return None;
        }
        info!("开始识别 {} 张图片 (语言: {})", images.len(), self.languages);

        let results = self.recognize_all(images).await;
        let mut failed = 0;
        let texts: Vec<String> = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.unwrap_or_else(|e| {
                    warn!("图片 #{} 识别失败: {}", index, e);
                    failed += 1;
                    String::new()
                })
            })
            .collect();

        info!("图片识别完成: {} 成功, {} 失败", texts.len() - failed, failed);

        if texts.iter().all(|t| t.trim().is_empty()) {
            return None;
        }
        Some(Block::paragraph(texts.join("\n")))
    }
}
