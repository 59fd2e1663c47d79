use futures::stream::{self, StreamExt};
use reqwest::Url;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Fetcher;
use crate::parser::{Block, ExtractionResult};
use crate::storage::AssetStore;
use crate::utils::{PackError, PackResult};

/// 从网页提取标题、段落和图片
pub struct WebPageExtractor {
    fetcher: Arc<dyn Fetcher>,
    image_concurrency: usize,
}

/// 一次解析得到的页面结构
#[derive(Debug, Default, PartialEq)]
pub struct ParsedPage {
    pub blocks: Vec<Block>,
    pub image_urls: Vec<String>,
}

impl WebPageExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>, image_concurrency: usize) -> Self {
        Self {
            fetcher,
            image_concurrency: image_concurrency.max(1),
        }
    }

    pub async fn extract(&self, url: &str, store: &mut AssetStore) -> ExtractionResult {
        let page = match self.fetch_page(url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("网页抓取失败 {}: {}", url, e);
                return ExtractionResult::empty();
            }
        };
        info!("网页解析: {} 个段落/标题, {} 张图片", page.blocks.len(), page.image_urls.len());

        let downloads: Vec<PackResult<Vec<u8>>> = stream::iter(page.image_urls.clone())
            .map(|image_url| {
                let fetcher = Arc::clone(&self.fetcher);
                async move { fetcher.fetch_binary(&image_url).await }
            })
            .buffered(self.image_concurrency)
            .collect()
            .await;

        let mut assets = Vec::new();
        for (image_url, download) in page.image_urls.iter().zip(downloads) {
            let stored = match download {
                Ok(bytes) => store.create(&bytes).await,
                Err(e) => Err(e),
            };
            match stored {
                Ok(asset) => {
                    debug!("{} -> {}", image_url, asset.name);
                    assets.push(asset);
                }
                Err(e) => warn!("图片下载失败，跳过 {}: {}", image_url, e),
            }
        }
        info!("网页图片: {}/{} 张成功", assets.len(), page.image_urls.len());

        ExtractionResult {
            blocks: page.blocks,
            assets,
        }
    }

    async fn fetch_page(&self, url: &str) -> PackResult<ParsedPage> {
        let base = Url::parse(url.trim()).map_err(|e| PackError::Fetch(format!("URL无效 '{}': {}", url, e)))?;
        let page = self.fetcher.fetch_url(base.as_str()).await?;
        if !(200..300).contains(&page.status) {
            warn!("{} 返回状态码 {}，仍解析返回内容", base, page.status);
        }
        parse_page(&page.body, &base)
    }
}

/// 按 body 深度优先顺序输出 h1-h6 和 p（原样保留文本，空元素也输出），同时收集所有 img 的绝对地址
pub fn parse_page(html: &str, base: &Url) -> PackResult<ParsedPage> {
    let body_selector = selector("body *")?;
    let img_selector = selector("img[src]")?;
    let document = Html::parse_document(html);

    let mut blocks = Vec::new();
    for element in document.select(&body_selector) {
        let tag = element.value().name();
        let block = match heading_level(tag) {
            Some(level) => Block::heading(level, element.text().collect::<String>()),
            None if tag == "p" => Block::paragraph(element.text().collect::<String>()),
            None => continue,
        };
        blocks.push(block);
    }

    let mut image_urls = Vec::new();
    for element in document.select(&img_selector) {
        let src = match element.value().attr("src").map(str::trim) {
            Some(src) if !src.is_empty() => src,
            _ => continue,
        };
        match base.join(src) {
            Ok(resolved) if matches!(resolved.scheme(), "http" | "https") => image_urls.push(resolved.to_string()),
            Ok(resolved) => debug!("跳过非HTTP图片: {}", resolved.scheme()),
            Err(e) => warn!("无法解析图片地址 '{}': {}", src, e),
        }
    }

    Ok(ParsedPage { blocks, image_urls })
}

fn selector(css: &str) -> PackResult<Selector> {
    Selector::parse(css).map_err(|e| PackError::Extraction(format!("选择器无效 '{}': {:?}", css, e)))
}

fn heading_level(tag: &str) -> Option<u8> {
    let digit = tag.strip_prefix('h')?;
    match digit.parse::<u8>() {
        Ok(level @ 1..=6) if digit.len() == 1 => Some(level),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crawler::FetchedPage;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// URL -> 响应体；不在表中的地址视为网络错误
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub pages: HashMap<String, String>,
        pub binaries: HashMap<String, Vec<u8>>,
        /// 未列出的页面返回 200
        pub statuses: HashMap<String, u16>,
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch_url(&self, url: &str) -> PackResult<FetchedPage> {
            self.pages
                .get(url)
                .map(|body| FetchedPage {
                    status: self.statuses.get(url).copied().unwrap_or(200),
                    body: body.clone(),
                })
                .ok_or_else(|| PackError::Fetch(format!("connection refused: {}", url)))
        }

        async fn fetch_binary(&self, url: &str) -> PackResult<Vec<u8>> {
            self.binaries
                .get(url)
                .cloned()
                .ok_or_else(|| PackError::Fetch(format!("404: {}", url)))
        }
    }

    pub(crate) const PAGE_URL: &str = "http://site.test/articles/one.html";

    pub(crate) fn sample_fetcher() -> FakeFetcher {
        let html = r#"<html><head><title>ignored</title></head><body>
            <nav><a href="/">home</a></nav>
            <h1>First   title</h1>
            <div><p>Intro <b>bold</b> text</p><img src="../img/a.png"></div>
            <h2>Second</h2>
            <img src="http://cdn.test/b.jpg">
            <img src="missing.png">
            <img src="data:image/png;base64,AAAA">
            <p>   </p>
        </body></html>"#;

        let mut fetcher = FakeFetcher::default();
        fetcher.pages.insert(PAGE_URL.to_string(), html.to_string());
        fetcher.binaries.insert("http://site.test/img/a.png".to_string(), b"\x89PNG\r\n\x1a\nA".to_vec());
        fetcher.binaries.insert("http://cdn.test/b.jpg".to_string(), b"\xff\xd8\xff\xe0B".to_vec());
        fetcher
    }

    #[test]
    fn parse_page_keeps_body_order() {
        let html = "<body><h1>H1</h1><p>P1</p><h2>H2</h2></body>";
        let base = Url::parse("http://site.test/").unwrap();
        let page = parse_page(html, &base).unwrap();
        assert_eq!(
            page.blocks,
            vec![Block::heading(1, "H1"), Block::paragraph("P1"), Block::heading(2, "H2")]
        );
    }

    #[test]
    fn parse_page_resolves_relative_images() {
        let base = Url::parse(PAGE_URL).unwrap();
        let fetcher = sample_fetcher();
        let page = parse_page(&fetcher.pages[PAGE_URL], &base).unwrap();
        assert_eq!(
            page.image_urls,
            vec![
                "http://site.test/img/a.png",
                "http://cdn.test/b.jpg",
                "http://site.test/articles/missing.png",
            ]
        );
    }

    #[test]
    fn heading_levels() {
        assert_eq!(heading_level("h1"), Some(1));
        assert_eq!(heading_level("h6"), Some(6));
        assert_eq!(heading_level("h7"), None);
        assert_eq!(heading_level("h10"), None);
        assert_eq!(heading_level("hr"), None);
        assert_eq!(heading_level("header"), None);
    }

    #[tokio::test]
    async fn failed_image_is_skipped_without_losing_text() {
        let root = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new_in(root.path()).unwrap();
        let extractor = WebPageExtractor::new(Arc::new(sample_fetcher()), 2);

        let result = extractor.extract(PAGE_URL, &mut store).await;

        assert_eq!(
            result.blocks,
            vec![
                Block::heading(1, "First   title"),
                Block::paragraph("Intro bold text"),
                Block::heading(2, "Second"),
                Block::paragraph("   "),
            ]
        );
        assert_eq!(result.assets.len(), 2);
        assert_eq!(store.list_all(), result.assets.as_slice());
        assert!(result.assets[0].name.ends_with(".png"));
        assert!(result.assets[1].name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn unreachable_page_yields_empty_result() {
        let root = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new_in(root.path()).unwrap();
        let extractor = WebPageExtractor::new(Arc::new(FakeFetcher::default()), 2);

        let result = extractor.extract("http://down.test/", &mut store).await;
        assert!(result.blocks.is_empty());
        assert!(result.assets.is_empty());

        let result = extractor.extract("not a url", &mut store).await;
        assert!(result.blocks.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn error_status_page_is_still_parsed() {
        let root = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new_in(root.path()).unwrap();
        let mut fetcher = sample_fetcher();
        fetcher.statuses.insert(PAGE_URL.to_string(), 404);
        let extractor = WebPageExtractor::new(Arc::new(fetcher), 2);

        let result = extractor.extract(PAGE_URL, &mut store).await;

        assert_eq!(result.blocks.len(), 4);
        assert_eq!(result.blocks[0], Block::heading(1, "First   title"));
        assert_eq!(result.assets.len(), 2);
    }
}
