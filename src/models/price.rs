use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, ScraperError};
use crate::util;

/// 日期区间，构造时保证 start < end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(ScraperError::Validation(format!(
                "to_date ({}) should be greater than from_date ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// 从 dd/mm/yyyy 格式的字符串构造
    pub fn parse(from_date: &str, to_date: &str) -> Result<Self> {
        let start = util::parse_dmy(from_date, "from_date")?;
        let end = util::parse_dmy(to_date, "to_date")?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn year_span(&self) -> i32 {
        use chrono::Datelike;
        self.end.year() - self.start.year()
    }
}

/// 一次历史数据请求对应的子区间，只由分段器产生
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRangeChunk {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// K线周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    /// 上游表单中 interval_sec 字段的取值
    pub fn as_form_value(&self) -> &'static str {
        match self {
            Interval::Daily => "Daily",
            Interval::Weekly => "Weekly",
            Interval::Monthly => "Monthly",
        }
    }
}

impl FromStr for Interval {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            "monthly" => Ok(Interval::Monthly),
            other => Err(ScraperError::Validation(format!(
                "interval can just be either 'Daily', 'Weekly' or 'Monthly', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_form_value())
    }
}

/// 结果排序方向，上游原生顺序为降序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ascending" | "asc" => Ok(SortOrder::Ascending),
            "descending" | "desc" => Ok(SortOrder::Descending),
            other => Err(ScraperError::Validation(format!(
                "order can just be ascending (asc) or descending (desc), got '{}'",
                other
            ))),
        }
    }
}

/// 结果输出形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// 以日期为索引的 Arrow 表
    #[default]
    Table,
    /// 字段命名的记录列表，用于 JSON 序列化
    RecordList,
}

/// 单个交易日（或周、月）的行情
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    #[serde(serialize_with = "util::serialize_dmy")]
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
}
