pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("网络请求错误: {0}")]
    Fetch(String),

    #[error("临时存储错误: {0}")]
    Storage(String),

    #[error("内容提取错误: {0}")]
    Extraction(String),

    #[error("文档编码错误: {0}")]
    Encoding(String),

    #[error("压缩包写入错误: {0}")]
    Archive(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl PackError {
    /// 只有编码和打包失败会终止整个请求
    pub fn is_request_fatal(&self) -> bool {
        matches!(self, PackError::Encoding(_) | PackError::Archive(_))
    }
}

impl From<reqwest::Error> for PackError {
    fn from(e: reqwest::Error) -> Self {
        PackError::Fetch(e.to_string())
    }
}

impl From<zip::result::ZipError> for PackError {
    fn from(e: zip::result::ZipError) -> Self {
        PackError::Archive(e.to_string())
    }
}

pub type PackResult<T> = Result<T, PackError>;
