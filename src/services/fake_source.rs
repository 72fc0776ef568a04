//! 测试用的 HtmlSource：按顺序返回预设响应，并记录每次请求

use crate::errors::Result;
use crate::scrapers::base::{Endpoint, HtmlSource};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub(crate) struct FakeSource {
    responses: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<(Endpoint, Vec<(String, String)>)>>,
    pages: Mutex<Vec<String>>,
}

impl FakeSource {
    pub(crate) fn new(responses: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            pages: Mutex::new(Vec::new()),
        })
    }

    /// 所有 POST 请求
    pub(crate) fn requests(&self) -> Vec<(Endpoint, Vec<(String, String)>)> {
        self.requests.lock().unwrap().clone()
    }

    /// 所有 GET 的页面路径
    pub(crate) fn pages(&self) -> Vec<String> {
        self.pages.lock().unwrap().clone()
    }

    fn next_response(&self) -> Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected extra request")
    }
}

#[async_trait]
impl HtmlSource for FakeSource {
    fn source_name(&self) -> &'static str {
        "fake"
    }

    async fn post_form(&self, endpoint: Endpoint, form: &[(String, String)]) -> Result<String> {
        self.requests.lock().unwrap().push((endpoint, form.to_vec()));
        self.next_response()
    }

    async fn get_page(&self, path: &str) -> Result<String> {
        self.pages.lock().unwrap().push(path.to_string());
        self.next_response()
    }
}

pub(crate) fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
    form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}
