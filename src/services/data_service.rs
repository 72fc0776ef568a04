use crate::config::{Config, FilterTables};
use crate::data_provider::ReferenceDataProvider;
use crate::errors::{Result, ScraperError};
use crate::models::calendar::{CalendarKind, CalendarPage, CalendarRow, PaginationCursor};
use crate::models::instrument::InstrumentFamily;
use crate::models::price::{DateRange, DateRangeChunk, Interval, PricePoint, Projection, SortOrder};
use crate::scrapers::base::{Endpoint, HtmlSource};
use crate::scrapers::calendar::parse_calendar_page;
use crate::scrapers::historical::extract_price_rows;
use crate::scrapers::investing::InvestingClient;
use crate::services::aggregator::{self, ChunkOutcome, ChunkSource, PageSource};
use crate::services::assembler::{self, PriceOutput, SeriesKind};
use crate::services::normalizer::{self, RowOutcome, RowSchema};
use crate::services::partition::partition;
use crate::util;
use async_trait::async_trait;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;

pub(crate) type Form = Vec<(String, String)>;

pub(crate) fn push(form: &mut Form, key: &str, value: impl ToString) {
    form.push((key.to_string(), value.to_string()));
}

/// 历史行情请求，日期格式为 dd/mm/yyyy
#[derive(Debug, Clone)]
pub struct HistoricalRequest {
    pub family: InstrumentFamily,
    pub name: String,
    pub country: Option<String>,
    pub stock_exchange: Option<String>,
    pub from_date: String,
    pub to_date: String,
    pub order: SortOrder,
    pub interval: Interval,
    pub projection: Projection,
}

impl HistoricalRequest {
    pub fn new(family: InstrumentFamily, name: &str, from_date: &str, to_date: &str) -> Self {
        Self {
            family,
            name: name.to_string(),
            country: None,
            stock_exchange: None,
            from_date: from_date.to_string(),
            to_date: to_date.to_string(),
            order: SortOrder::default(),
            interval: Interval::default(),
            projection: Projection::default(),
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn with_stock_exchange(mut self, exchange: &str) -> Self {
        self.stock_exchange = Some(exchange.to_string());
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// 最近一个月左右的行情，不带日期区间
#[derive(Debug, Clone)]
pub struct RecentRequest {
    pub family: InstrumentFamily,
    pub name: String,
    pub country: Option<String>,
    pub stock_exchange: Option<String>,
    pub order: SortOrder,
    pub interval: Interval,
    pub projection: Projection,
}

impl RecentRequest {
    pub fn new(family: InstrumentFamily, name: &str) -> Self {
        Self {
            family,
            name: name.to_string(),
            country: None,
            stock_exchange: None,
            order: SortOrder::default(),
            interval: Interval::default(),
            projection: Projection::default(),
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn with_stock_exchange(mut self, exchange: &str) -> Self {
        self.stock_exchange = Some(exchange.to_string());
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// 财经日历请求。importances / categories 只对经济日历有效，
/// 节假日日历最多接受一个国家
#[derive(Debug, Clone)]
pub struct CalendarRequest {
    pub kind: CalendarKind,
    pub time_zone: Option<String>,
    pub time_filter: String,
    pub countries: Vec<String>,
    pub importances: Vec<String>,
    pub categories: Vec<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

impl CalendarRequest {
    pub fn new(kind: CalendarKind) -> Self {
        Self {
            kind,
            time_zone: None,
            time_filter: "time_only".to_string(),
            countries: Vec::new(),
            importances: Vec::new(),
            categories: Vec::new(),
            from_date: None,
            to_date: None,
        }
    }

    pub fn with_time_zone(mut self, time_zone: &str) -> Self {
        self.time_zone = Some(time_zone.to_string());
        self
    }

    pub fn with_time_filter(mut self, time_filter: &str) -> Self {
        self.time_filter = time_filter.to_string();
        self
    }

    pub fn with_countries(mut self, countries: Vec<String>) -> Self {
        self.countries = countries;
        self
    }

    pub fn with_importances(mut self, importances: Vec<String>) -> Self {
        self.importances = importances;
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_date_range(mut self, from_date: &str, to_date: &str) -> Self {
        self.from_date = Some(from_date.to_string());
        self.to_date = Some(to_date.to_string());
        self
    }
}

/// 一次行情调用的结果
#[derive(Debug, Clone)]
pub struct PriceData {
    pub name: String,
    pub kind: SeriesKind,
    pub output: PriceOutput,
}

impl PriceData {
    /// {"name": ..., "historical"|"recent": [...]}
    pub fn to_json(&self) -> Result<Value> {
        assembler::json_document(&self.name, self.kind, &self.output.to_records()?)
    }
}

/// 数据服务，负责参数校验、查找参考数据、分段请求与结果组装
pub struct DataService {
    config: Config,
    reference: ReferenceDataProvider,
    source: Arc<dyn HtmlSource>,
}

impl DataService {
    /// 创建新的数据服务实例
    pub fn new(config: Config, reference: ReferenceDataProvider, source: Arc<dyn HtmlSource>) -> Self {
        Self {
            config,
            reference,
            source,
        }
    }

    /// 从配置加载参考数据并创建 HTTP 客户端
    pub fn from_config(config: Config) -> Result<Self> {
        let reference = ReferenceDataProvider::load_from_dir(&config.data_dir)?;
        let client = InvestingClient::new(&config)?;
        Ok(Self::new(config, reference, Arc::new(client)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reference(&self) -> &ReferenceDataProvider {
        &self.reference
    }

    pub(crate) fn source(&self) -> &dyn HtmlSource {
        self.source.as_ref()
    }

    fn base_price_form(&self, family: InstrumentFamily, record_id: u64, header: String, interval: Interval) -> Form {
        debug!("building {} request form for id {}", family, record_id);
        let mut form = Form::new();
        push(&mut form, "curr_id", record_id);
        push(&mut form, "header", header);
        push(&mut form, "interval_sec", interval.as_form_value());
        push(&mut form, "sort_col", "date");
        push(&mut form, "sort_ord", "DESC");
        push(&mut form, "action", "historical_data");
        form
    }

    /// 获取指定区间的历史行情，区间超过 max_span_years 时分段请求
    pub async fn historical_data(&self, request: &HistoricalRequest) -> Result<PriceData> {
        let range = DateRange::parse(&request.from_date, &request.to_date)?;
        let chunks = partition(&range, self.config.max_span_years)?;

        let record = self.reference.lookup(
            request.family,
            &request.name,
            request.country.as_deref(),
            request.stock_exchange.as_deref(),
        )?;
        record.ensure_retrievable(request.family)?;
        let schema = request.family.schema();

        info!(
            "Fetching {} '{}' ({}) from {} to {} in {} request(s) via {}",
            request.family,
            record.name,
            record.id,
            range.start(),
            range.end(),
            chunks.len(),
            self.source.source_name()
        );

        let source = HistoricalChunks {
            source: self.source.as_ref(),
            form: self.base_price_form(request.family, record.id, record.request_header(&schema), request.interval),
            row_schema: RowSchema::for_record(request.family, record, self.config.exchange_tz),
        };

        let rows = aggregator::aggregate_chunks(&source, &chunks).await?;
        let output = assembler::assemble(rows, request.order, request.projection)?;

        Ok(PriceData {
            name: record.name.clone(),
            kind: SeriesKind::Historical,
            output,
        })
    }

    /// 获取最近的行情（上游默认窗口）
    pub async fn recent_data(&self, request: &RecentRequest) -> Result<PriceData> {
        let record = self.reference.lookup(
            request.family,
            &request.name,
            request.country.as_deref(),
            request.stock_exchange.as_deref(),
        )?;
        record.ensure_retrievable(request.family)?;
        let schema = request.family.schema();
        let row_schema = RowSchema::for_record(request.family, record, self.config.exchange_tz);

        info!("Fetching recent {} data for '{}' ({})", request.family, record.name, record.id);

        let mut form = self.base_price_form(request.family, record.id, record.request_header(&schema), request.interval);
        push(&mut form, "smlID", random_sml_id());
        let body = self.source.post_form(Endpoint::HistoricalData, &form).await?;

        let mut rows = match rows_from_body(&body, &row_schema)? {
            ChunkOutcome::Rows(rows) if !rows.is_empty() => rows,
            _ => {
                return Err(ScraperError::NoData(format!(
                    "no recent data found for {} '{}'",
                    request.family, record.name
                )))
            }
        };
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        rows.dedup_by_key(|point| point.date);

        let output = assembler::assemble(rows, request.order, request.projection)?;
        Ok(PriceData {
            name: record.name.clone(),
            kind: SeriesKind::Recent,
            output,
        })
    }

    /// 分页获取财经日历，直到上游没有新数据
    pub async fn calendar(&self, request: &CalendarRequest) -> Result<Vec<CalendarRow>> {
        let form = match request.kind {
            CalendarKind::Economic | CalendarKind::Earnings => self.filtered_calendar_form(request)?,
            CalendarKind::Holidays => self.holiday_calendar_form(request)?,
        };
        let endpoint = match request.kind {
            CalendarKind::Economic => Endpoint::EconomicCalendar,
            CalendarKind::Earnings => Endpoint::EarningsCalendar,
            CalendarKind::Holidays => Endpoint::HolidayCalendar,
        };

        info!("Fetching {} calendar with {} filter fields", request.kind, form.len());

        let pager = CalendarPager {
            source: self.source.as_ref(),
            endpoint,
            kind: request.kind,
            form,
            tables: &self.config.filters,
        };
        let rows = aggregator::paginate(&pager).await?;

        info!("{} calendar returned {} rows", request.kind, rows.len());
        Ok(rows)
    }

    fn time_zone_id(&self, time_zone: Option<&str>) -> Result<u32> {
        let tables = &self.config.filters;
        let label = match time_zone {
            Some(label) => label.trim().to_string(),
            None => default_time_zone(tables),
        };
        tables
            .time_zones
            .get(label.as_str())
            .and_then(|ids| ids.choose(&mut rand::thread_rng()).copied())
            .ok_or_else(|| ScraperError::Validation(format!("time zone '{}' is not available", label)))
    }

    fn time_filter_value(&self, time_filter: &str) -> Result<&'static str> {
        self.config
            .filters
            .time_filters
            .get(time_filter.trim())
            .copied()
            .ok_or_else(|| {
                ScraperError::Validation(format!(
                    "time filter '{}' is not valid, expected time_only or time_remaining",
                    time_filter
                ))
            })
    }

    fn country_ids(&self, countries: &[String]) -> Result<Vec<u32>> {
        countries
            .iter()
            .map(|country| {
                self.config
                    .filters
                    .country_id(country)
                    .ok_or_else(|| ScraperError::NotFound(format!("country '{}' not found", country)))
            })
            .collect()
    }

    fn filtered_calendar_form(&self, request: &CalendarRequest) -> Result<Form> {
        let tables = &self.config.filters;
        let dates = calendar_dates(request)?;

        if request.kind == CalendarKind::Earnings && (!request.importances.is_empty() || !request.categories.is_empty()) {
            return Err(ScraperError::Validation(
                "earnings calendar does not filter by importance or category".to_string(),
            ));
        }

        let mut form = Form::new();
        push(&mut form, "timeZone", self.time_zone_id(request.time_zone.as_deref())?);
        push(&mut form, "timeFilter", self.time_filter_value(&request.time_filter)?);

        match dates {
            Some(range) => {
                push(&mut form, "currentTab", "custom");
                push(&mut form, "dateFrom", range.start().format("%Y-%m-%d"));
                push(&mut form, "dateTo", range.end().format("%Y-%m-%d"));
            }
            None => push(&mut form, "currentTab", "today"),
        }
        push(&mut form, "submitFilters", 1);

        for id in self.country_ids(&request.countries)? {
            push(&mut form, "country[]", id);
        }

        for category in &request.categories {
            let value = tables
                .categories
                .get(category.trim().to_lowercase().as_str())
                .ok_or_else(|| ScraperError::Validation(format!("category '{}' is not valid", category)))?;
            push(&mut form, "category[]", value);
        }

        for importance in &request.importances {
            let key = tables.importance_key(importance).ok_or_else(|| {
                ScraperError::Validation(format!(
                    "importance '{}' is not valid, expected low, medium or high",
                    importance
                ))
            })?;
            push(&mut form, "importance[]", key);
        }

        Ok(form)
    }

    fn holiday_calendar_form(&self, request: &CalendarRequest) -> Result<Form> {
        if request.countries.len() > 1 {
            return Err(ScraperError::Validation(
                "holiday calendar accepts at most one country".to_string(),
            ));
        }
        if !request.importances.is_empty() || !request.categories.is_empty() {
            return Err(ScraperError::Validation(
                "holiday calendar does not filter by importance or category".to_string(),
            ));
        }

        let country = match self.country_ids(&request.countries)?.first() {
            Some(id) => id.to_string(),
            None => String::new(),
        };

        let mut form = Form::new();
        match calendar_dates(request)? {
            Some(range) => {
                push(&mut form, "dateFrom", range.start().format("%Y-%m-%d"));
                push(&mut form, "dateTo", range.end().format("%Y-%m-%d"));
                push(&mut form, "timeZone", self.time_zone_id(request.time_zone.as_deref())?);
                push(&mut form, "timeFilter", self.time_filter_value(&request.time_filter)?);
                push(&mut form, "currentTab", "custom");
                push(&mut form, "submitFilters", 1);
            }
            None => push(&mut form, "currentTab", "today"),
        }
        push(&mut form, "country", country);

        Ok(form)
    }
}

fn calendar_dates(request: &CalendarRequest) -> Result<Option<DateRange>> {
    match (request.from_date.as_deref(), request.to_date.as_deref()) {
        (Some(from), Some(to)) => DateRange::parse(from, to).map(Some),
        (None, None) => Ok(None),
        _ => Err(ScraperError::Validation(
            "from_date and to_date must be given together".to_string(),
        )),
    }
}

fn random_sml_id() -> u32 {
    rand::thread_rng().gen_range(1_000_000..=99_999_999)
}

/// 本地时区对应的 "GMT ±H:MM" 标签，不在表中时使用 GMT
pub fn default_time_zone(tables: &FilterTables) -> String {
    let offset = chrono::Local::now().offset().local_minus_utc();
    let label = format_gmt_offset(offset);
    if tables.time_zones.contains_key(label.as_str()) {
        label
    } else {
        "GMT".to_string()
    }
}

fn format_gmt_offset(seconds: i32) -> String {
    if seconds == 0 {
        return "GMT".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("GMT {}{}:{:02}", sign, minutes / 60, minutes % 60)
}

// 响应体 -> 子区间结果；哨兵行与数据行混在一起时忽略哨兵行
fn rows_from_body(body: &str, schema: &RowSchema) -> Result<ChunkOutcome> {
    if body.trim().is_empty() {
        return Ok(ChunkOutcome::EmptyBody);
    }

    let mut points: Vec<PricePoint> = Vec::new();
    let mut sentinel = false;
    for raw in extract_price_rows(body)? {
        match normalizer::normalize(&raw, schema)? {
            RowOutcome::Point(point) => points.push(point),
            RowOutcome::Sentinel => sentinel = true,
        }
    }

    if points.is_empty() && sentinel {
        Ok(ChunkOutcome::NoResults)
    } else {
        Ok(ChunkOutcome::Rows(points))
    }
}

struct HistoricalChunks<'a> {
    source: &'a dyn HtmlSource,
    form: Form,
    row_schema: RowSchema,
}

#[async_trait]
impl<'a> ChunkSource for HistoricalChunks<'a> {
    async fn fetch_chunk(&self, chunk: &DateRangeChunk) -> Result<ChunkOutcome> {
        let mut form = self.form.clone();
        push(&mut form, "smlID", random_sml_id());
        push(&mut form, "st_date", util::format_mdy(&chunk.start));
        push(&mut form, "end_date", util::format_mdy(&chunk.end));

        let body = self.source.post_form(Endpoint::HistoricalData, &form).await?;
        rows_from_body(&body, &self.row_schema)
    }
}

struct CalendarPager<'a> {
    source: &'a dyn HtmlSource,
    endpoint: Endpoint,
    kind: CalendarKind,
    form: Form,
    tables: &'a FilterTables,
}

#[async_trait]
impl<'a> PageSource for CalendarPager<'a> {
    async fn fetch_page(&self, cursor: &PaginationCursor, continuation: Option<&str>) -> Result<CalendarPage> {
        let mut form = self.form.clone();
        push(&mut form, "limit_from", cursor.page_offset);
        if self.kind == CalendarKind::Holidays {
            if let Some(scope) = continuation {
                push(&mut form, "last_time_scope", scope);
                push(&mut form, "showMore", "true");
            }
        }

        let body = self.source.post_form(self.endpoint, &form).await?;
        parse_calendar_page(self.kind, &body, self.tables, cursor.last_date)
    }
}
