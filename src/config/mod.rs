use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use anyhow::{Context, Result};

pub const SETTINGS_PATH: &str = "config/settings.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub fetch: FetchConfig,
    pub ocr: OcrConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
    pub max_images: usize,
    pub max_body_bytes: usize,
    pub archive_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// 网页图片同时下载数
    pub image_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrConfig {
    pub tesseract_path: String,
    /// tesseract 的 -l 参数，多语言用 + 连接
    pub languages: String,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// 为空时使用系统临时目录
    pub temp_root: Option<String>,
}

impl AppConfig {
    /// 默认值 -> config/settings.toml -> DOCPACK__* 环境变量 -> PORT
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name(SETTINGS_PATH).required(false))
            .add_source(
                config::Environment::with_prefix("DOCPACK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("读取配置失败")?;

        let mut app_config: AppConfig = settings.try_deserialize().context("解析配置失败")?;
        app_config.apply_port_override(std::env::var("PORT").ok().as_deref())?;
        Ok(app_config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_port_override(&mut self, port: Option<&str>) -> Result<()> {
        if let Some(port) = port.filter(|p| !p.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT 不是合法端口: {}", port))?;
        }
        Ok(())
    }

    pub fn temp_root(&self) -> PathBuf {
        self.storage
            .temp_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                static_dir: "public".to_string(),
                max_images: 10,
                max_body_bytes: 64 * 1024 * 1024,
                archive_name: "output.zip".to_string(),
            },
            fetch: FetchConfig {
                user_agent: "docpack/0.1".to_string(),
                timeout_secs: 30,
                image_concurrency: 4,
            },
            ocr: OcrConfig {
                tesseract_path: "tesseract".to_string(),
                languages: "tha+eng".to_string(),
                concurrency: 2,
            },
            storage: StorageConfig { temp_root: None },
        }
    }
}
