use std::sync::Arc;
use tracing::{info, warn};

use super::{Block, ExtractionResult, ImageAnalyzer, PDF_MARKER};
use crate::storage::AssetStore;
use crate::utils::{PackError, PackResult};

/// 整篇 PDF 文本提取引擎
pub trait PdfTextSource: Send + Sync {
    fn extract_text(&self, pdf: &[u8]) -> PackResult<String>;
}

/// 基于 pdf-extract 的默认实现
pub struct PdfExtractText;

impl PdfTextSource for PdfExtractText {
    fn extract_text(&self, pdf: &[u8]) -> PackResult<String> {
        pdf_extract::extract_text_from_mem(pdf).map_err(|e| PackError::Extraction(e.to_string()))
    }
}

pub struct PdfParser {
    text_source: Arc<dyn PdfTextSource>,
    image_analyzer: Arc<ImageAnalyzer>,
}

impl PdfParser {
    pub fn with_text_source(text_source: Arc<dyn PdfTextSource>) -> Self {
        Self {
            text_source,
            image_analyzer: Arc::new(ImageAnalyzer::new()),
        }
    }

    /// 提取文本行和嵌入图片。两条路径互不影响，失败都只记录日志。
    pub async fn extract(&self, pdf: Vec<u8>, store: &mut AssetStore) -> ExtractionResult {
        info!("解析PDF: {} 字节", pdf.len());
        let pdf = Arc::new(pdf);

        let (text, images) = tokio::join!(
            self.extract_full_text(Arc::clone(&pdf)),
            self.extract_images(Arc::clone(&pdf)),
        );

        let blocks = match text {
            Ok(text) => text_to_blocks(&text),
            Err(e) => {
                warn!("PDF文本提取失败: {}", e);
                Vec::new()
            }
        };
        if blocks.is_empty() {
            warn!("PDF中未提取到文本内容");
        } else {
            info!("成功提取 {} 行文本", blocks.len() - 1);
        }

        let mut assets = Vec::new();
        for (index, bytes) in images.into_iter().enumerate() {
            match store.create(&bytes).await {
                Ok(asset) => assets.push(asset),
                Err(e) => warn!("PDF图片 #{} 暂存失败: {}", index, e),
            }
        }

        ExtractionResult { blocks, assets }
    }

    async fn extract_full_text(&self, pdf: Arc<Vec<u8>>) -> PackResult<String> {
        let source = Arc::clone(&self.text_source);
        let text = tokio::task::spawn_blocking(move || source.extract_text(&pdf))
            .await
            .map_err(|e| PackError::Extraction(format!("文本提取任务异常退出: {}", e)))??;
        info!("提取文本长度: {} 字符", text.len());
        Ok(text)
    }

    async fn extract_images(&self, pdf: Arc<Vec<u8>>) -> Vec<Vec<u8>> {
        let analyzer = Arc::clone(&self.image_analyzer);
        let result = tokio::task::spawn_blocking(move || analyzer.extract_images(&pdf))
            .await
            .map_err(|e| PackError::Extraction(format!("图片提取任务异常退出: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(images) => images,
            Err(e) => {
                warn!("PDF图片提取失败: {}", e);
                Vec::new()
            }
        }
    }
}

/// 每行一个段落，空行原样保留；全文非空白时在最前面加一级标题
pub fn text_to_blocks(text: &str) -> Vec<Block> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut blocks = vec![Block::heading(1, PDF_MARKER)];
    blocks.extend(text.split('\n').map(Block::paragraph));
    blocks
}
