use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::parser::{Block, Document};
use crate::utils::{PackError, PackResult};

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

/// 各级标题字号（半磅）
const HEADING_SIZES: [u32; 6] = [32, 28, 26, 24, 22, 20];

/// 把 Document 编码为 .docx（WordprocessingML 包）
pub struct DocxEncoder;

impl DocxEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, document: &Document) -> PackResult<Vec<u8>> {
        let body = self.document_xml(document)?;
        let styles = styles_xml();

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let parts: [(&str, &[u8]); 5] = [
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
            ("_rels/.rels", PACKAGE_RELS.as_bytes()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes()),
            ("word/styles.xml", styles.as_bytes()),
            ("word/document.xml", body.as_slice()),
        ];
        for (name, content) in parts {
            zip.start_file(name, options).map_err(encoding_err)?;
            zip.write_all(content).map_err(encoding_err)?;
        }
        let cursor = zip.finish().map_err(encoding_err)?;
        Ok(cursor.into_inner())
    }

    fn document_xml(&self, document: &Document) -> PackResult<Vec<u8>> {
        let mut w = Writer::new(Cursor::new(Vec::new()));
        event(&mut w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        start(&mut w, "w:document", &[("xmlns:w", WORD_NS), ("xmlns:r", REL_NS)])?;
        start(&mut w, "w:body", &[])?;

        for (index, block) in document.blocks.iter().enumerate() {
            match block {
                Block::Heading { level, text } => {
                    if !(1..=6).contains(level) {
                        return Err(PackError::Encoding(format!("第 {} 个块的标题级别无效: {}", index, level)));
                    }
                    let style = format!("Heading{}", level);
                    start(&mut w, "w:p", &[])?;
                    start(&mut w, "w:pPr", &[])?;
                    empty(&mut w, "w:pStyle", &[("w:val", &style)])?;
                    end(&mut w, "w:pPr")?;
                    run(&mut w, text, true)?;
                    end(&mut w, "w:p")?;
                }
                Block::Paragraph { text } => {
                    start(&mut w, "w:p", &[])?;
                    run(&mut w, text, false)?;
                    end(&mut w, "w:p")?;
                }
            }
        }

        // A4，四边 1 英寸
        start(&mut w, "w:sectPr", &[])?;
        empty(&mut w, "w:pgSz", &[("w:w", "11906"), ("w:h", "16838")])?;
        empty(&mut w, "w:pgMar", &[
            ("w:top", "1440"),
            ("w:right", "1440"),
            ("w:bottom", "1440"),
            ("w:left", "1440"),
            ("w:header", "708"),
            ("w:footer", "708"),
            ("w:gutter", "0"),
        ])?;
        end(&mut w, "w:sectPr")?;

        end(&mut w, "w:body")?;
        end(&mut w, "w:document")?;
        Ok(w.into_inner().into_inner())
    }
}

/// 一个 run，文本中的换行写成 <w:br/>
fn run(w: &mut Writer<Cursor<Vec<u8>>>, text: &str, bold: bool) -> PackResult<()> {
    start(w, "w:r", &[])?;
    if bold {
        start(w, "w:rPr", &[])?;
        empty(w, "w:b", &[])?;
        end(w, "w:rPr")?;
    }
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            empty(w, "w:br", &[])?;
        }
        start(w, "w:t", &[("xml:space", "preserve")])?;
        let line = xml_text(line.trim_end_matches('\r'));
        event(w, Event::Text(BytesText::new(&line)))?;
        end(w, "w:t")?;
    }
    end(w, "w:r")
}

/// 去掉 XML 1.0 不允许出现的字符（PDF 和 OCR 输出里常见控制字符）
fn xml_text(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|c| is_xml_char(*c)).collect())
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..)
}

fn styles_xml() -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{}"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>"#,
        WORD_NS
    );
    for (i, size) in HEADING_SIZES.iter().enumerate() {
        let level = i + 1;
        xml.push_str(&format!(
            r#"<w:style w:type="paragraph" w:styleId="Heading{level}"><w:name w:val="heading {level}"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="{outline}"/></w:pPr><w:rPr><w:b/><w:sz w:val="{size}"/></w:rPr></w:style>"#,
            level = level,
            outline = i,
            size = size,
        ));
    }
    xml.push_str("</w:styles>");
    xml
}

fn event(w: &mut Writer<Cursor<Vec<u8>>>, e: Event<'_>) -> PackResult<()> {
    w.write_event(e).map_err(encoding_err)
}

fn start(w: &mut Writer<Cursor<Vec<u8>>>, name: &str, attrs: &[(&str, &str)]) -> PackResult<()> {
    event(w, Event::Start(BytesStart::new(name).with_attributes(attrs.iter().copied())))
}

fn empty(w: &mut Writer<Cursor<Vec<u8>>>, name: &str, attrs: &[(&str, &str)]) -> PackResult<()> {
    event(w, Event::Empty(BytesStart::new(name).with_attributes(attrs.iter().copied())))
}

fn end(w: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> PackResult<()> {
    event(w, Event::End(BytesEnd::new(name)))
}

fn encoding_err(e: impl std::fmt::Display) -> PackError {
    PackError::Encoding(e.to_string())
}
