use crate::parser::{Block, Document, ExtractionResult, IMAGES_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Url,
    Pdf,
    Images,
}

/// 合并顺序：网页内容优先，其次 PDF，最后图片识别文本
pub const SOURCE_PRECEDENCE: [Source; 3] = [Source::Url, Source::Pdf, Source::Images];

/// 按固定优先级合并各来源的块。缺失或为空的来源不产生任何块（包括标题）。
pub fn assemble(
    url: Option<ExtractionResult>,
    pdf: Option<ExtractionResult>,
    image_text: Option<Block>,
) -> Document {
    let mut url = url.map(|r| r.blocks).unwrap_or_default();
    let mut pdf = pdf.map(|r| r.blocks).unwrap_or_default();
    let mut images = image_section(image_text);

    let mut blocks = Vec::with_capacity(url.len() + pdf.len() + images.len());
    for source in SOURCE_PRECEDENCE {
        let section = match source {
            Source::Url => &mut url,
            Source::Pdf => &mut pdf,
            Source::Images => &mut images,
        };
        blocks.append(section);
    }

    Document { blocks }
}

fn image_section(image_text: Option<Block>) -> Vec<Block> {
    match image_text {
        Some(block) if !block.text().trim().is_empty() => vec![Block::heading(1, IMAGES_MARKER), block],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::PDF_MARKER;

    fn result(blocks: Vec<Block>) -> Option<ExtractionResult> {
        Some(ExtractionResult { blocks, assets: Vec::new() })
    }

    #[test]
    fn url_then_pdf_then_images() {
        let document = assemble(
            result(vec![Block::heading(1, "Page"), Block::paragraph("body")]),
            result(vec![Block::heading(1, PDF_MARKER), Block::paragraph("line")]),
            Some(Block::paragraph("ocr")),
        );
        assert_eq!(
            document.blocks,
            vec![
                Block::heading(1, "Page"),
                Block::paragraph("body"),
                Block::heading(1, PDF_MARKER),
                Block::paragraph("line"),
                Block::heading(1, IMAGES_MARKER),
                Block::paragraph("ocr"),
            ]
        );
    }

    #[test]
    fn absent_or_empty_sources_add_nothing() {
        assert!(assemble(None, None, None).is_empty());
        assert!(assemble(result(vec![]), result(vec![]), None).is_empty());
        assert!(assemble(None, None, Some(Block::paragraph("  "))).is_empty());

        let document = assemble(None, result(vec![]), Some(Block::paragraph("ocr")));
        assert_eq!(
            document.blocks,
            vec![Block::heading(1, IMAGES_MARKER), Block::paragraph("ocr")]
        );
    }

    #[test]
    fn precedence_is_fixed() {
        assert_eq!(SOURCE_PRECEDENCE, [Source::Url, Source::Pdf, Source::Images]);
    }
}
