use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::utils::{PackError, PackResult};

/// 暂存的图片文件句柄，名字只由随机 UUID 和嗅探出的扩展名组成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub path: PathBuf,
}

/// 单个请求的临时图片仓库。
///
/// 提取阶段只追加，打包阶段读取后调用 `release_all` 删除全部文件。
/// 底层目录是 `TempDir`，即使请求中途 panic，目录也会在 drop 时被移除。
/// 目录创建失败时使用 `detached`：此后每次 `create` 都返回 Storage 错误。
pub struct AssetStore {
    dir: Option<TempDir>,
    assets: Vec<Asset>,
}

impl AssetStore {
    pub fn new_in(root: &Path) -> PackResult<Self> {
        std::fs::create_dir_all(root)
            .map_err(|e| PackError::Storage(format!("无法创建临时根目录 {}: {}", root.display(), e)))?;
        let dir = tempfile::Builder::new()
            .prefix("docpack-")
            .tempdir_in(root)
            .map_err(|e| PackError::Storage(format!("无法创建临时目录: {}", e)))?;
        debug!("临时目录: {}", dir.path().display());
        Ok(Self {
            dir: Some(dir),
            assets: Vec::new(),
        })
    }

    /// 没有暂存目录的仓库，不能保存任何图片
    pub fn detached() -> Self {
        Self {
            dir: None,
            assets: Vec::new(),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// 写入一份图片数据，返回新建的句柄
    pub async fn create(&mut self, bytes: &[u8]) -> PackResult<Asset> {
        let dir = self
            .dir()
            .ok_or_else(|| PackError::Storage("暂存目录不可用".to_string()))?;
        let name = format!("{}.{}", Uuid::new_v4(), sniff_extension(bytes));
        let path = dir.join(&name);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PackError::Storage(format!("写入 {} 失败: {}", name, e)))?;

        debug!("暂存图片 {} ({} 字节)", name, bytes.len());
        let asset = Asset { name, path };
        self.assets.push(asset.clone());
        Ok(asset)
    }

    /// 按创建顺序返回全部图片
    pub fn list_all(&self) -> &[Asset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// 删除全部暂存文件，可重复调用。单个文件删除失败只记录日志。
    pub async fn release_all(&mut self) -> usize {
        let mut removed = 0;
        for asset in self.assets.drain(..) {
            match tokio::fs::remove_file(&asset.path).await {
                Ok(_) => {
                    debug!("已删除: {}", asset.name);
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("文件已不存在: {}", asset.name);
                }
                Err(e) => {
                    warn!("删除失败 {}: {}", asset.path.display(), e);
                }
            }
        }
        if removed > 0 {
            info!("已清理 {} 个临时文件", removed);
        }
        removed
    }
}

fn sniff_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0";

    #[tokio::test]
    async fn create_keeps_creation_order_and_random_names() {
        let root = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new_in(root.path()).unwrap();

        let first = store.create(PNG_MAGIC).await.unwrap();
        let second = store.create(JPEG_MAGIC).await.unwrap();

        assert_eq!(store.list_all(), &[first.clone(), second.clone()]);
        assert!(first.name.ends_with(".png"));
        assert!(second.name.ends_with(".jpg"));
        assert_ne!(first.name, second.name);
        assert!(first.path.starts_with(store.dir().unwrap()));
        assert_eq!(std::fs::read(&second.path).unwrap(), JPEG_MAGIC);
    }

    #[tokio::test]
    async fn unknown_bytes_default_to_png() {
        let root = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new_in(root.path()).unwrap();
        let asset = store.create(b"not an image").await.unwrap();
        assert!(asset.name.ends_with(".png"));
    }

    #[tokio::test]
    async fn release_all_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new_in(root.path()).unwrap();
        let a = store.create(PNG_MAGIC).await.unwrap();
        let b = store.create(PNG_MAGIC).await.unwrap();

        assert_eq!(store.release_all().await, 2);
        assert!(!a.path.exists());
        assert!(!b.path.exists());
        assert!(store.is_empty());

        assert_eq!(store.release_all().await, 0);
    }

    #[tokio::test]
    async fn release_all_continues_after_missing_file() {
        let root = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new_in(root.path()).unwrap();
        let gone = store.create(PNG_MAGIC).await.unwrap();
        let kept = store.create(PNG_MAGIC).await.unwrap();
        std::fs::remove_file(&gone.path).unwrap();

        assert_eq!(store.release_all().await, 1);
        assert!(!kept.path.exists());
    }

    #[tokio::test]
    async fn dropping_store_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new_in(root.path()).unwrap();
        store.create(PNG_MAGIC).await.unwrap();
        let dir = store.dir().unwrap().to_path_buf();
        drop(store);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn detached_store_rejects_every_create() {
        let mut store = AssetStore::detached();
        assert!(store.dir().is_none());

        let err = store.create(PNG_MAGIC).await.unwrap_err();
        assert!(matches!(err, PackError::Storage(_)));
        assert!(!err.is_request_fatal());
        assert!(store.is_empty());
        assert_eq!(store.release_all().await, 0);
    }

    #[test]
    fn root_under_a_file_cannot_be_opened() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let err = AssetStore::new_in(&blocker.join("nested")).err().unwrap();
        assert!(matches!(err, PackError::Storage(_)));
    }
}
