use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::FetchConfig;
use crate::utils::{PackError, PackResult};

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

/// 网络访问接口，测试中替换为内存实现
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_url(&self, url: &str) -> PackResult<FetchedPage>;
    async fn fetch_binary(&self, url: &str) -> PackResult<Vec<u8>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> PackResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| PackError::Config(format!("无法创建HTTP客户端: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_url(&self, url: &str) -> PackResult<FetchedPage> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("GET {} -> {} ({} 字节)", url, status, body.len());
        Ok(FetchedPage { status, body })
    }

    async fn fetch_binary(&self, url: &str) -> PackResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PackError::Fetch(format!("{} 返回 {}", url, status)));
        }
        let bytes = response.bytes().await?;
        debug!("GET {} -> {} 字节", url, bytes.len());
        Ok(bytes.to_vec())
    }
}
