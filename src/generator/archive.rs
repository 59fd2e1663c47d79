use std::io::{Seek, Write};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::storage::AssetStore;
use crate::utils::{PackError, PackResult};

pub const DOCUMENT_ENTRY: &str = "document.docx";

/// 把文档和全部暂存图片打成一个 zip
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self
    }

    /// 写入 zip 后无论成败都会清空 AssetStore
    pub async fn build<W: Write + Seek>(&self, document: &[u8], store: &mut AssetStore, out: W) -> PackResult<W> {
        let entries = self.read_assets(store).await;
        let result = self.write_archive(document, &entries, out);
        store.release_all().await;

        match &result {
            Ok(_) => info!("压缩包完成: 文档 + {} 张图片", entries.len()),
            Err(e) => warn!("压缩包写入失败: {}", e),
        }
        result
    }

    /// 按创建顺序读取图片；单个文件读不到时跳过
    async fn read_assets(&self, store: &AssetStore) -> Vec<(String, Vec<u8>)> {
        let mut entries = Vec::with_capacity(store.len());
        for asset in store.list_all() {
            match tokio::fs::read(&asset.path).await {
                Ok(bytes) => entries.push((asset.name.clone(), bytes)),
                Err(e) => warn!("读取暂存图片失败，跳过 {}: {}", asset.name, e),
            }
        }
        entries
    }

    fn write_archive<W: Write + Seek>(&self, document: &[u8], entries: &[(String, Vec<u8>)], out: W) -> PackResult<W> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9));

        let mut zip = ZipWriter::new(out);
        zip.start_file(DOCUMENT_ENTRY, options)?;
        zip.write_all(document).map_err(|e| PackError::Archive(e.to_string()))?;

        for (name, bytes) in entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes).map_err(|e| PackError::Archive(e.to_string()))?;
        }

        Ok(zip.finish()?)
    }
}
