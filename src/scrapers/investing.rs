use crate::config::Config;
use crate::errors::{Result, ScraperError};
use crate::scrapers::base::{Endpoint, HtmlSource};
use async_trait::async_trait;
use log::debug;
use rand::seq::SliceRandom;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Investing.com AJAX 接口客户端
pub struct InvestingClient {
    client: Client,
    base_url: String,
    user_agents: Vec<String>,
    request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl InvestingClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ScraperError::RequestError)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            user_agents: config.user_agents.clone(),
            request_interval: config.request_interval,
            last_request: Mutex::new(None),
        })
    }

    // 同一客户端的两次请求之间至少间隔 request_interval
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(time) = *last {
            let elapsed = time.elapsed();
            if elapsed < self.request_interval {
                let wait_time = self.request_interval - elapsed;
                debug!("等待 {:?} 以遵守频率限制", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }

    fn random_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or("Mozilla/5.0")
    }
}

#[async_trait]
impl HtmlSource for InvestingClient {
    fn source_name(&self) -> &'static str {
        "investing.com"
    }

    async fn post_form(&self, endpoint: Endpoint, form: &[(String, String)]) -> Result<String> {
        self.wait_for_rate_limit().await;

        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!("POST {} ({} form fields)", url, form.len());

        let request = self
            .client
            .post(&url)
            .header("User-Agent", self.random_user_agent().to_string())
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Accept", "text/html")
            .header("Connection", "keep-alive")
            .form(form);

        send(request, endpoint.path()).await
    }

    async fn get_page(&self, path: &str) -> Result<String> {
        self.wait_for_rate_limit().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let request = self
            .client
            .get(&url)
            .header("User-Agent", self.random_user_agent().to_string())
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Accept", "text/html")
            .header("Connection", "keep-alive");

        send(request, path).await
    }
}

// 非 2xx 状态码统一转成 Transport 错误
async fn send(request: reqwest::RequestBuilder, endpoint: &str) -> Result<String> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::Transport {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
        });
    }

    let text = response.text().await?;
    debug!("成功获取响应，{} 字节", text.len());
    Ok(text)
}
