pub mod assembler;

pub use assembler::assemble;

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::crawler::{Fetcher, HttpFetcher, WebPageExtractor};
use crate::generator::{ArchiveBuilder, DocxEncoder};
use crate::parser::{Document, OcrExtractor, PdfExtractText, PdfParser, PdfTextSource, TesseractRecognizer, TextRecognizer};
use crate::storage::AssetStore;
use crate::utils::PackResult;

/// 一次转换请求的输入
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    pub url: Option<String>,
    pub pdf: Option<Vec<u8>>,
    pub images: Vec<Vec<u8>>,
}

impl ConversionRequest {
    /// 空白 URL 视为未提供
    pub fn new(url: Option<String>, pdf: Option<Vec<u8>>, images: Vec<Vec<u8>>) -> Self {
        let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        Self { url, pdf, images }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ExtractingUrl,
    ExtractingPdf,
    ExtractingImages,
    Assembling,
    Encoding,
    Archiving,
    Done,
}

#[derive(Debug)]
pub struct ConversionOutput {
    pub document: Document,
    pub archive: Vec<u8>,
    pub asset_count: usize,
}

/// 请求级调度：按需运行三个提取器，合并、编码、打包
pub struct Pipeline {
    web: WebPageExtractor,
    pdf: PdfParser,
    ocr: OcrExtractor,
    encoder: DocxEncoder,
    archiver: ArchiveBuilder,
    temp_root: PathBuf,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> PackResult<Self> {
        Ok(Self::with_collaborators(
            Arc::new(HttpFetcher::new(&config.fetch)?),
            Arc::new(PdfExtractText),
            Arc::new(TesseractRecognizer::new(config.ocr.tesseract_path.clone())),
            config,
        ))
    }

    pub fn with_collaborators(
        fetcher: Arc<dyn Fetcher>,
        pdf_text: Arc<dyn PdfTextSource>,
        recognizer: Arc<dyn TextRecognizer>,
        config: &AppConfig,
    ) -> Self {
        Self {
            web: WebPageExtractor::new(fetcher, config.fetch.image_concurrency),
            pdf: PdfParser::with_text_source(pdf_text),
            ocr: OcrExtractor::new(recognizer, &config.ocr),
            encoder: DocxEncoder::new(),
            archiver: ArchiveBuilder::new(),
            temp_root: config.temp_root(),
        }
    }

    /// 提取阶段和暂存目录的失败都在内部消化；只有编码和打包失败会返回错误。
    /// 任何返回路径上暂存文件都会被清理。
    pub async fn run(&self, request: ConversionRequest) -> PackResult<ConversionOutput> {
        let mut stage = Stage::Idle;
        let mut store = match AssetStore::new_in(&self.temp_root) {
            Ok(store) => store,
            Err(e) => {
                warn!("暂存目录不可用，本次不收集图片: {}", e);
                AssetStore::detached()
            }
        };
        if let Some(dir) = store.dir() {
            info!("开始转换, 暂存目录: {}", dir.display());
        }

        let url_result = match request.url.as_deref() {
            Some(url) => {
                advance(&mut stage, Stage::ExtractingUrl);
                Some(self.web.extract(url, &mut store).await)
            }
            None => None,
        };

        let pdf_result = match request.pdf {
            Some(pdf) => {
                advance(&mut stage, Stage::ExtractingPdf);
                Some(self.pdf.extract(pdf, &mut store).await)
            }
            None => None,
        };

        let image_text = if request.images.is_empty() {
            None
        } else {
            advance(&mut stage, Stage::ExtractingImages);
            self.ocr.extract(&request.images).await
        };

        advance(&mut stage, Stage::Assembling);
        let document = assemble(url_result, pdf_result, image_text);
        info!("文档共 {} 个块, 暂存图片 {} 张", document.len(), store.len());

        advance(&mut stage, Stage::Encoding);
        let encoded = match self.encoder.encode(&document) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("文档编码失败: {}", e);
                store.release_all().await;
                return Err(e);
            }
        };

        advance(&mut stage, Stage::Archiving);
        let asset_count = store.len();
        let archive = self
            .archiver
            .build(&encoded, &mut store, Cursor::new(Vec::new()))
            .await
            .map_err(|e| {
                error!("打包失败: {}", e);
                e
            })?
            .into_inner();

        advance(&mut stage, Stage::Done);
        Ok(ConversionOutput {
            document,
            archive,
            asset_count,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    info!("阶段 {:?} -> {:?}", stage, next);
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::web_page::tests::{sample_fetcher, FakeFetcher, PAGE_URL};
    use crate::generator::archive::tests::read_entries;
    use crate::generator::docx::tests::decode_blocks;
    use crate::generator::DOCUMENT_ENTRY;
    use crate::parser::ocr::tests::ScriptedRecognizer;
    use crate::parser::pdf_parser::tests::{single_image_pdf, FixedText, JPEG_BYTES};
    use crate::parser::{Block, IMAGES_MARKER, PDF_MARKER};

    fn pipeline(root: &std::path::Path, fetcher: FakeFetcher, pdf_text: &str) -> Pipeline {
        let mut config = AppConfig::default();
        config.storage.temp_root = Some(root.to_string_lossy().to_string());
        Pipeline::with_collaborators(
            Arc::new(fetcher),
            Arc::new(FixedText(Ok(pdf_text.to_string()))),
            Arc::new(ScriptedRecognizer),
            &config,
        )
    }

    fn temp_dirs_left(root: &std::path::Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn no_inputs_gives_empty_document_only() {
        let root = tempfile::tempdir().unwrap();
        let output = pipeline(root.path(), FakeFetcher::default(), "")
            .run(ConversionRequest::new(Some("   ".into()), None, vec![]))
            .await
            .unwrap();

        assert!(output.document.is_empty());
        let entries = read_entries(&output.archive);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, DOCUMENT_ENTRY);
        assert!(decode_blocks(&entries[0].1).is_empty());
        assert_eq!(temp_dirs_left(root.path()), 0);
    }

    #[tokio::test]
    async fn pdf_with_text_and_one_image() {
        let root = tempfile::tempdir().unwrap();
        let output = pipeline(root.path(), FakeFetcher::default(), "Hello\nWorld")
            .run(ConversionRequest::new(None, Some(single_image_pdf()), vec![]))
            .await
            .unwrap();

        let expected = vec![
            Block::heading(1, PDF_MARKER),
            Block::paragraph("Hello"),
            Block::paragraph("World"),
        ];
        assert_eq!(output.document.blocks, expected);

        let entries = read_entries(&output.archive);
        assert_eq!(entries.len(), 2);
        assert_eq!(decode_blocks(&entries[0].1), expected);
        assert!(entries[1].0.ends_with(".jpg"));
        assert_eq!(entries[1].1, JPEG_BYTES);
        assert_eq!(temp_dirs_left(root.path()), 0);
    }

    #[tokio::test]
    async fn one_failed_ocr_call_is_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let images = vec![b"ok:alpha".to_vec(), b"crash".to_vec(), b"ok:gamma".to_vec()];
        let output = pipeline(root.path(), FakeFetcher::default(), "")
            .run(ConversionRequest::new(None, None, images))
            .await
            .unwrap();

        assert_eq!(
            output.document.blocks,
            vec![Block::heading(1, IMAGES_MARKER), Block::paragraph("alpha\n\ngamma")]
        );
        assert_eq!(output.asset_count, 0);
        assert_eq!(read_entries(&output.archive).len(), 1);
    }

    #[tokio::test]
    async fn all_sources_follow_precedence() {
        let root = tempfile::tempdir().unwrap();
        let request = ConversionRequest::new(
            Some(PAGE_URL.to_string()),
            Some(single_image_pdf()),
            vec![b"ok:scanned".to_vec()],
        );
        let output = pipeline(root.path(), sample_fetcher(), "pdf line")
            .run(request)
            .await
            .unwrap();

        assert_eq!(
            output.document.blocks,
            vec![
                Block::heading(1, "First   title"),
                Block::paragraph("Intro bold text"),
                Block::heading(2, "Second"),
                Block::paragraph("   "),
                Block::heading(1, PDF_MARKER),
                Block::paragraph("pdf line"),
                Block::heading(1, IMAGES_MARKER),
                Block::paragraph("scanned"),
            ]
        );

        // 网页 2 张 (另一张下载失败) + PDF 1 张
        assert_eq!(output.asset_count, 3);
        let entries = read_entries(&output.archive);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].0, DOCUMENT_ENTRY);
        assert_eq!(entries[3].1, JPEG_BYTES);
        assert_eq!(temp_dirs_left(root.path()), 0);
    }

    #[tokio::test]
    async fn unreachable_url_does_not_block_other_sources() {
        let root = tempfile::tempdir().unwrap();
        let request = ConversionRequest::new(Some("http://down.test/".into()), None, vec![b"ok:text".to_vec()]);
        let output = pipeline(root.path(), FakeFetcher::default(), "")
            .run(request)
            .await
            .unwrap();

        assert_eq!(
            output.document.blocks,
            vec![Block::heading(1, IMAGES_MARKER), Block::paragraph("text")]
        );
    }

    #[tokio::test]
    async fn unusable_temp_root_still_produces_document() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let mut config = AppConfig::default();
        config.storage.temp_root = Some(blocker.join("nested").to_string_lossy().to_string());
        let pipeline = Pipeline::with_collaborators(
            Arc::new(FakeFetcher::default()),
            Arc::new(FixedText(Ok("only text".to_string()))),
            Arc::new(ScriptedRecognizer),
            &config,
        );

        let output = pipeline
            .run(ConversionRequest::new(None, Some(single_image_pdf()), vec![b"ok:scan".to_vec()]))
            .await
            .unwrap();

        assert_eq!(
            output.document.blocks,
            vec![
                Block::heading(1, PDF_MARKER),
                Block::paragraph("only text"),
                Block::heading(1, IMAGES_MARKER),
                Block::paragraph("scan"),
            ]
        );
        assert_eq!(output.asset_count, 0);
        let entries = read_entries(&output.archive);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, DOCUMENT_ENTRY);
    }

    #[test]
    fn run_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let root = tempfile::tempdir().unwrap();
        let pipeline = pipeline(root.path(), FakeFetcher::default(), "");
        let future = pipeline.run(ConversionRequest::default());
        assert_send(&future);
    }
}
