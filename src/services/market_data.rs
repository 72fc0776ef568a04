//! 行情之外的页面数据：概要信息、按国家概览、技术分析、全站搜索、分红与公司简介

use crate::errors::{Result, ScraperError};
use crate::models::instrument::{InstrumentFamily, InstrumentRecord};
use crate::models::market::{CompanyProfile, Dividend, MovingAverage, OverviewRow, PivotPoint, QuoteResult, TechnicalIndicator, TechnicalInterval};
use crate::scrapers::base::Endpoint;
use crate::scrapers::pages::{self, MoreDividends};
use crate::scrapers::search::{self, SEARCH_PAGE_SIZE};
use crate::scrapers::technical;
use crate::services::data_service::{push, DataService, Form};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

const MAX_OVERVIEW_RESULTS: usize = 1000;

/// 按国家列出某类产品的实时概览
#[derive(Debug, Clone)]
pub struct OverviewRequest {
    pub family: InstrumentFamily,
    pub country: String,
    /// 1 到 1000
    pub n_results: usize,
}

impl OverviewRequest {
    pub fn new(family: InstrumentFamily, country: &str) -> Self {
        Self {
            family,
            country: country.to_string(),
            n_results: 100,
        }
    }

    pub fn with_n_results(mut self, n_results: usize) -> Self {
        self.n_results = n_results;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TechnicalRequest {
    pub family: InstrumentFamily,
    pub name: String,
    pub country: Option<String>,
    pub interval: TechnicalInterval,
}

impl TechnicalRequest {
    pub fn new(family: InstrumentFamily, name: &str) -> Self {
        Self {
            family,
            name: name.to_string(),
            country: None,
            interval: TechnicalInterval::default(),
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn with_interval(mut self, interval: TechnicalInterval) -> Self {
        self.interval = interval;
        self
    }
}

/// 全站行情搜索，filters 为 stocks、etfs 等类别名，countries 为小写国家名
#[derive(Debug, Clone)]
pub struct QuoteSearchRequest {
    pub text: String,
    pub filters: Vec<String>,
    pub countries: Vec<String>,
    pub n_results: Option<usize>,
}

impl QuoteSearchRequest {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            filters: Vec::new(),
            countries: Vec::new(),
            n_results: None,
        }
    }

    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_countries(mut self, countries: Vec<String>) -> Self {
        self.countries = countries;
        self
    }

    pub fn with_n_results(mut self, n_results: usize) -> Self {
        self.n_results = Some(n_results);
        self
    }
}

impl DataService {
    fn retrievable_record(
        &self,
        family: InstrumentFamily,
        name: &str,
        country: Option<&str>,
    ) -> Result<&InstrumentRecord> {
        let record = self.reference().lookup(family, name, country, None)?;
        record.ensure_retrievable(family)?;
        Ok(record)
    }

    /// 产品页面上的概要信息，键为页面标题（Prev. Close、Market Cap 等）
    pub async fn information(
        &self,
        family: InstrumentFamily,
        name: &str,
        country: Option<&str>,
    ) -> Result<BTreeMap<String, Value>> {
        let record = self.retrievable_record(family, name, country)?;
        let path = format!("/{}/{}", family.page_section(), record.page_tag()?);
        let display_name = record.lookup_value(family.schema().lookup_key).to_string();

        info!("Fetching {} information for '{}' from {}", family, record.name, path);
        let body = self.source().get_page(&path).await?;
        pages::parse_information(&body, family.information_name_key(), &display_name)
    }

    /// 某国家某类产品的概览表
    pub async fn overview(&self, request: &OverviewRequest) -> Result<Vec<OverviewRow>> {
        if request.n_results == 0 || request.n_results > MAX_OVERVIEW_RESULTS {
            return Err(ScraperError::Validation(format!(
                "n_results should be an integer between 1 and {}",
                MAX_OVERVIEW_RESULTS
            )));
        }
        let (path, table) = request.family.overview_page(&request.country).ok_or_else(|| {
            ScraperError::Validation(format!("{} has no overview by country", request.family))
        })?;

        let country = request.country.trim().to_lowercase();
        if !self.reference().list_countries(request.family)?.contains(&country) {
            return Err(ScraperError::NotFound(format!(
                "country {} not found, check if it is correct",
                request.country
            )));
        }

        info!("Fetching {} overview for {} from {}", request.family, country, path);
        let body = self.source().get_page(&path).await?;
        let rows = pages::parse_overview(&body, table, request.n_results)?;

        if rows.is_empty() {
            return Err(ScraperError::NoData(format!(
                "no {} overview results found for {}",
                request.family, country
            )));
        }
        Ok(rows)
    }

    async fn technical_body(&self, request: &TechnicalRequest) -> Result<String> {
        if request.family == InstrumentFamily::Crypto {
            return Err(ScraperError::Validation(
                "technical data is not available for crypto currencies".to_string(),
            ));
        }
        let record = self.retrievable_record(request.family, &request.name, request.country.as_deref())?;

        info!(
            "Fetching {} technical data for '{}' ({}) with interval {}",
            request.family, record.name, record.id, request.interval
        );

        let mut form = Form::new();
        push(&mut form, "pairID", record.id);
        push(&mut form, "period", request.interval.as_form_value());
        push(&mut form, "viewType", "normal");
        self.source().post_form(Endpoint::TechnicalData, &form).await
    }

    pub async fn technical_indicators(&self, request: &TechnicalRequest) -> Result<Vec<TechnicalIndicator>> {
        let body = self.technical_body(request).await?;
        non_empty(technical::parse_technical_indicators(&body)?, "technical indicators", &request.name)
    }

    pub async fn moving_averages(&self, request: &TechnicalRequest) -> Result<Vec<MovingAverage>> {
        let body = self.technical_body(request).await?;
        non_empty(technical::parse_moving_averages(&body)?, "moving averages", &request.name)
    }

    pub async fn pivot_points(&self, request: &TechnicalRequest) -> Result<Vec<PivotPoint>> {
        let body = self.technical_body(request).await?;
        non_empty(technical::parse_pivot_points(&body)?, "pivot points", &request.name)
    }

    /// 在全站搜索行情，按 id 去重，逐页请求直到结果足够或上游没有更多
    pub async fn search_quotes(&self, request: &QuoteSearchRequest) -> Result<Vec<QuoteResult>> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(ScraperError::Validation("search text is mandatory".to_string()));
        }
        if request.n_results == Some(0) {
            return Err(ScraperError::Validation("n_results should be at least 1".to_string()));
        }
        let pair_types = request
            .filters
            .iter()
            .map(|filter| search::pair_type_filter(filter))
            .collect::<Result<HashSet<_>>>()?;
        let countries: HashSet<String> = request
            .countries
            .iter()
            .map(|country| country.trim().to_lowercase())
            .filter(|country| !country.is_empty())
            .collect();

        let mut results = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0u64;

        loop {
            let mut form = Form::new();
            push(&mut form, "search_text", text);
            push(&mut form, "tab", "quotes");
            push(&mut form, "limit", SEARCH_PAGE_SIZE);
            push(&mut form, "offset", offset);

            let body = self.source().post_form(Endpoint::QuoteSearch, &form).await?;
            let page = search::parse_quote_page(&body)?;
            if page.total == 0 {
                return Err(ScraperError::NoData(format!("no quotes found for '{}'", text)));
            }
            debug!("quote search offset {}: {} of {} quotes", offset, page.quotes.len(), page.total);

            let fetched = page.quotes.len();
            for quote in page.quotes {
                let accepted = (pair_types.is_empty() || pair_types.contains(quote.pair_type.as_str()))
                    && (countries.is_empty() || countries.contains(&quote.country));
                if accepted && seen.insert(quote.id) {
                    results.push(quote);
                }
            }

            offset += SEARCH_PAGE_SIZE;
            let wanted = request.n_results.unwrap_or(page.total as usize);
            if results.len() >= wanted || offset >= page.total || fetched == 0 {
                results.truncate(wanted);
                break;
            }
        }

        if results.is_empty() {
            return Err(ScraperError::NoData(format!(
                "no quotes for '{}' match the requested filters",
                text
            )));
        }
        info!("quote search for '{}' returned {} results", text, results.len());
        Ok(results)
    }

    /// 股票的历史分红，首屏来自分红页面，之后通过 MoreDividendsHistory 翻页
    pub async fn stock_dividends(&self, name: &str, country: &str) -> Result<Vec<Dividend>> {
        let record = self.retrievable_record(InstrumentFamily::Stock, name, Some(country))?;
        let path = format!("/equities/{}-dividends", record.page_tag()?);

        info!("Fetching dividends for '{}' from {}", record.name, path);
        let body = self.source().get_page(&path).await?;
        let page = pages::parse_dividends_page(&body)?.ok_or_else(|| {
            ScraperError::NoData(format!("stock {} has no dividends data to display", record.name))
        })?;

        let mut dividends = page.rows;
        let mut last_timestamp = page.last_timestamp;

        while let Some(timestamp) = last_timestamp.take() {
            let mut form = Form::new();
            push(&mut form, "pairID", &page.pair_id);
            push(&mut form, "last_timestamp", &timestamp);

            let body = self.source().post_form(Endpoint::MoreDividends, &form).await?;
            let MoreDividends {
                has_more,
                rows,
                last_timestamp: next,
            } = pages::parse_more_dividends(&body)?;

            if has_more.is_none() || rows.is_empty() {
                break;
            }
            dividends.extend(rows);
            if has_more == Some(false) {
                break;
            }
            if next.as_deref() == Some(timestamp.as_str()) {
                warn!("dividends pagination repeated timestamp {}, stopping", timestamp);
                break;
            }
            last_timestamp = next;
        }

        info!("'{}' has {} dividend records", record.name, dividends.len());
        Ok(dividends)
    }

    /// 公司简介页的描述文本
    pub async fn company_profile(&self, name: &str, country: &str) -> Result<CompanyProfile> {
        let record = self.retrievable_record(InstrumentFamily::Stock, name, Some(country))?;
        let path = format!("/equities/{}-company-profile", record.page_tag()?);
        let url = format!("{}{}", self.config().base_url, path);

        info!("Fetching company profile for '{}'", record.name);
        let body = self.source().get_page(&path).await?;
        pages::parse_company_profile(&body, &url)
    }
}

fn non_empty<T>(items: Vec<T>, what: &str, name: &str) -> Result<Vec<T>> {
    if items.is_empty() {
        return Err(ScraperError::NoData(format!("no {} found for {}", what, name)));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data_provider::ReferenceDataProvider;
    use crate::errors::ErrorKind;
    use crate::services::fake_source::{field, FakeSource};
    use std::sync::Arc;

    fn reference() -> ReferenceDataProvider {
        ReferenceDataProvider::new_with_data(vec![
            (
                InstrumentFamily::Stock,
                vec![InstrumentRecord {
                    id: 396,
                    name: "BBVA".to_string(),
                    symbol: Some("BBVA".to_string()),
                    country: Some("spain".to_string()),
                    currency: Some("EUR".to_string()),
                    tag: Some("bbva".to_string()),
                    ..Default::default()
                }],
            ),
            (
                InstrumentFamily::Index,
                vec![InstrumentRecord {
                    id: 174,
                    name: "IBEX 35".to_string(),
                    country: Some("spain".to_string()),
                    currency: Some("EUR".to_string()),
                    tag: Some("spain-35".to_string()),
                    ..Default::default()
                }],
            ),
            (
                InstrumentFamily::Crypto,
                vec![InstrumentRecord {
                    id: 1057391,
                    name: "Tether".to_string(),
                    tag: Some("tether".to_string()),
                    status: Some("unavailable".to_string()),
                    ..Default::default()
                }],
            ),
        ])
    }

    fn service(source: Arc<FakeSource>) -> DataService {
        DataService::new(Config::new(), reference(), source)
    }

    #[tokio::test]
    async fn test_information_uses_product_page() {
        let page = r#"<div class="overviewDataTable"><div><span class="float_lang_base_1">Volume</span><span>6,520,412</span></div></div>"#;
        let source = FakeSource::new(vec![Ok(page.to_string())]);
        let service = service(source.clone());

        let info = service
            .information(InstrumentFamily::Stock, "bbva", Some("spain"))
            .await
            .unwrap();
        assert_eq!(info["Stock Symbol"], "BBVA");
        assert_eq!(info["Volume"], 6520412.0);
        assert_eq!(source.pages(), vec!["/equities/bbva".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_crypto_information_fails_before_io() {
        let source = FakeSource::new(vec![]);
        let err = service(source.clone())
            .information(InstrumentFamily::Crypto, "tether", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(source.pages().is_empty());
    }

    #[tokio::test]
    async fn test_overview_validation_and_no_rows() {
        let source = FakeSource::new(vec![Ok("<table id=\"cr1\"><tbody></tbody></table>".to_string())]);
        let service = service(source.clone());

        let err = service
            .overview(&OverviewRequest::new(InstrumentFamily::Index, "spain").with_n_results(1001))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .overview(&OverviewRequest::new(InstrumentFamily::Index, "atlantis"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service
            .overview(&OverviewRequest::new(InstrumentFamily::Crypto, "spain"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(source.pages().is_empty());

        let err = service
            .overview(&OverviewRequest::new(InstrumentFamily::Index, "Spain"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoData);
        assert_eq!(
            source.pages(),
            vec!["/indices/spain-indices?&majorIndices=on&primarySectors=on&additionalIndices=on&otherIndices=on".to_string()]
        );
    }

    #[tokio::test]
    async fn test_technical_form() {
        let html = r#"<table class="technicalIndicatorsTbl"><tbody>
            <tr><td class="symbol">RSI(14)</td><td>61.2</td><td>Buy</td></tr></tbody></table>"#;
        let source = FakeSource::new(vec![Ok(html.to_string())]);
        let request = TechnicalRequest::new(InstrumentFamily::Stock, "BBVA")
            .with_country("spain")
            .with_interval(TechnicalInterval::Weekly);

        let indicators = service(source.clone()).technical_indicators(&request).await.unwrap();
        assert_eq!(indicators[0].signal, "buy");

        let requests = source.requests();
        assert_eq!(requests[0].0, Endpoint::TechnicalData);
        assert_eq!(field(&requests[0].1, "pairID"), Some("396"));
        assert_eq!(field(&requests[0].1, "period"), Some("week"));
        assert_eq!(field(&requests[0].1, "viewType"), Some("normal"));
    }

    #[tokio::test]
    async fn test_technical_rejects_crypto() {
        let source = FakeSource::new(vec![]);
        let request = TechnicalRequest::new(InstrumentFamily::Crypto, "Bitcoin");
        let err = service(source.clone()).pivot_points(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(source.requests().is_empty());
    }

    fn quote_json(id: u64, flag: &str, pair_type: &str) -> serde_json::Value {
        serde_json::json!({
            "pairId": id, "name": format!("Quote {}", id), "symbol": "Q", "flag": flag,
            "link": format!("/equities/quote-{}", id), "pair_type": pair_type, "exchange": "X"
        })
    }

    #[tokio::test]
    async fn test_search_pages_filters_and_dedups() {
        let first = serde_json::json!({
            "total": {"quotes": 300},
            "quotes": [quote_json(1, "USA", "equities"), quote_json(2, "Spain", "equities"), quote_json(3, "USA", "etf")]
        });
        let second = serde_json::json!({
            "total": {"quotes": 300},
            "quotes": [quote_json(1, "USA", "equities"), quote_json(4, "USA", "equities")]
        });
        let source = FakeSource::new(vec![Ok(first.to_string()), Ok(second.to_string())]);
        let request = QuoteSearchRequest::new("quote")
            .with_filters(vec!["stocks".to_string()])
            .with_countries(vec!["United States".to_string()]);

        let results = service(source.clone()).search_quotes(&request).await.unwrap();
        assert_eq!(results.iter().map(|q| q.id).collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(results[1].tag, "quote-4");

        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(field(&requests[0].1, "offset"), Some("0"));
        assert_eq!(field(&requests[1].1, "offset"), Some("270"));
        assert_eq!(field(&requests[1].1, "limit"), Some("270"));
    }

    #[tokio::test]
    async fn test_search_stops_at_n_results() {
        let body = serde_json::json!({
            "total": {"quotes": 900},
            "quotes": [quote_json(7, "Japan", "indice"), quote_json(8, "Japan", "indice")]
        });
        let source = FakeSource::new(vec![Ok(body.to_string())]);
        let request = QuoteSearchRequest::new("nikkei").with_n_results(1);

        let results = service(source.clone()).search_quotes(&request).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].country, "japan");
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_search_validation_and_no_results() {
        let source = FakeSource::new(vec![Ok(r#"{"total": {"quotes": 0}, "quotes": []}"#.to_string())]);
        let service = service(source.clone());

        let err = service.search_quotes(&QuoteSearchRequest::new("  ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = service
            .search_quotes(&QuoteSearchRequest::new("x").with_filters(vec!["options".to_string()]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(source.requests().is_empty());

        let err = service.search_quotes(&QuoteSearchRequest::new("zzzz")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoData);
    }

    fn dividend_tr(ts: i64) -> String {
        format!(
            "<tr event_timestamp=\"{ts}\"><td class=\"first left\" data-value=\"{ts}\">d</td><td>0.1</td>\
             <td data-value=\"3\"></td><td>p</td><td>3%</td></tr>",
            ts = ts
        )
    }

    #[tokio::test]
    async fn test_dividends_follow_more_history() {
        let first = format!(
            "<table id=\"dividendsHistoryData396\"><tbody>{}</tbody></table>",
            dividend_tr(1570492800)
        );
        let more = serde_json::json!({ "hasMoreHistory": "1", "historyRows": dividend_tr(1554854400) });
        let last = serde_json::json!({ "hasMoreHistory": false, "historyRows": dividend_tr(1538956800) });
        let source = FakeSource::new(vec![Ok(first), Ok(more.to_string()), Ok(last.to_string())]);

        let dividends = service(source.clone()).stock_dividends("BBVA", "spain").await.unwrap();
        assert_eq!(dividends.len(), 3);
        assert_eq!(source.pages(), vec!["/equities/bbva-dividends".to_string()]);

        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, Endpoint::MoreDividends);
        assert_eq!(field(&requests[0].1, "pairID"), Some("396"));
        assert_eq!(field(&requests[0].1, "last_timestamp"), Some("1570492800"));
        assert_eq!(field(&requests[1].1, "last_timestamp"), Some("1554854400"));
    }

    #[tokio::test]
    async fn test_dividends_stop_on_missing_flag_and_no_table() {
        let first = format!(
            "<table id=\"dividendsHistoryData396\"><tbody>{}</tbody></table>",
            dividend_tr(1570492800)
        );
        let source = FakeSource::new(vec![
            Ok(first),
            Ok(r#"{"historyRows": "<tr><td>x</td></tr>"}"#.to_string()),
            Ok("<html><body></body></html>".to_string()),
        ]);
        let service = service(source.clone());

        let dividends = service.stock_dividends("BBVA", "spain").await.unwrap();
        assert_eq!(dividends.len(), 1);

        let err = service.stock_dividends("BBVA", "spain").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoData);
    }

    #[tokio::test]
    async fn test_company_profile_page() {
        let source = FakeSource::new(vec![Ok(
            "<div id=\"profile-fullStory-showhide\">BBVA is a bank.</div>".to_string()
        )]);
        let profile = service(source.clone()).company_profile("bbva", "spain").await.unwrap();
        assert_eq!(profile.description.as_deref(), Some("BBVA is a bank."));
        assert!(profile.url.ends_with("/equities/bbva-company-profile"));
        assert_eq!(source.pages(), vec!["/equities/bbva-company-profile".to_string()]);
    }
}
