use crate::errors::Result;
use async_trait::async_trait;

/// 上游的 AJAX 接口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    HistoricalData,
    EconomicCalendar,
    EarningsCalendar,
    HolidayCalendar,
    TechnicalData,
    QuoteSearch,
    MoreDividends,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::HistoricalData => "/instruments/HistoricalDataAjax",
            Endpoint::EconomicCalendar => "/economic-calendar/Service/getCalendarFilteredData",
            Endpoint::EarningsCalendar => "/earnings-calendar/Service/getCalendarFilteredData",
            Endpoint::HolidayCalendar => "/holiday-calendar/Service/getCalendarFilteredData",
            // 上游路径本身拼错了
            Endpoint::TechnicalData => "/instruments/Service/GetTechincalData",
            Endpoint::QuoteSearch => "/search/service/SearchInnerPage",
            Endpoint::MoreDividends => "/equities/MoreDividendsHistory",
        }
    }
}

/// Base trait for HTML data sources
#[async_trait]
pub trait HtmlSource: Send + Sync {
    /// Name of the upstream site, used in logs
    fn source_name(&self) -> &'static str;

    /// POST a form to the endpoint and return the response body.
    /// Non-success status codes are reported as transport errors.
    async fn post_form(&self, endpoint: Endpoint, form: &[(String, String)]) -> Result<String>;

    /// GET a site page such as `/equities/bbva`, path and query included.
    async fn get_page(&self, path: &str) -> Result<String>;
}
