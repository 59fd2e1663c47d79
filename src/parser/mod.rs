pub mod pdf_parser;
pub mod image_analyzer;
pub mod ocr;

pub use pdf_parser::{PdfExtractText, PdfParser, PdfTextSource};
pub use image_analyzer::ImageAnalyzer;
pub use ocr::{OcrExtractor, TesseractRecognizer, TextRecognizer};

use serde::{Deserialize, Serialize};

use crate::storage::Asset;

pub const PDF_MARKER: &str = "Extracted Text from PDF";
pub const IMAGES_MARKER: &str = "Extracted Text from Images";

/// 文档中的一个段落级单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    /// level 取值 1..=6
    Heading { level: u8, text: String },
    Paragraph { text: String },
}

impl Block {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading { level, text: text.into() }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Block::Heading { text, .. } | Block::Paragraph { text } => text,
        }
    }
}

/// 合并后的最终文档，交给编码器后不再修改
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// 单个来源的提取结果
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub blocks: Vec<Block>,
    pub assets: Vec<Asset>,
}

impl ExtractionResult {
    pub fn empty() -> Self {
        Self::default()
    }
}
