use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, ScraperError};
use crate::util;

/// 日历类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarKind {
    Economic,
    Earnings,
    Holidays,
}

impl FromStr for CalendarKind {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "economic" => Ok(CalendarKind::Economic),
            "earnings" => Ok(CalendarKind::Earnings),
            "holidays" | "holiday" => Ok(CalendarKind::Holidays),
            other => Err(ScraperError::Validation(format!(
                "unknown calendar '{}', expected economic, earnings or holidays",
                other
            ))),
        }
    }
}

impl fmt::Display for CalendarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarKind::Economic => f.write_str("economic"),
            CalendarKind::Earnings => f.write_str("earnings"),
            CalendarKind::Holidays => f.write_str("holidays"),
        }
    }
}

/// 日历中的一行，不同日历的字段不同
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarRow {
    pub id: String,
    #[serde(serialize_with = "util::serialize_dmy")]
    pub date: NaiveDate,
    pub fields: BTreeMap<String, String>,
}

/// 解析后尚未补全日期的行。date 为空表示沿用上一个显式日期
#[derive(Debug, Clone, PartialEq)]
pub struct RawCalendarRow {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub fields: BTreeMap<String, String>,
}

/// 一次分页请求的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarPage {
    pub rows: Vec<RawCalendarRow>,
    /// 上游是否声明还有更多数据（bind_scroll_handler）；None 表示上游未提供
    pub has_more: Option<bool>,
    /// 下一页需要回传的 last_time_scope
    pub continuation: Option<String>,
}

impl CalendarPage {
    /// 本页最后一行的标识
    pub fn terminal_id(&self) -> Option<&str> {
        self.rows.last().map(|row| row.id.as_str())
    }
}

/// 分页游标，只在一次调用内有效
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationCursor {
    pub page_offset: u32,
    pub last_seen_id: Option<String>,
    /// 已取各页中最后一个显式日期
    pub last_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str) -> RawCalendarRow {
        RawCalendarRow {
            id: id.to_string(),
            date: None,
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn test_terminal_id_is_last_row() {
        let page = CalendarPage {
            rows: vec![raw("323"), raw("9"), raw("71")],
            ..Default::default()
        };
        assert_eq!(page.terminal_id(), Some("71"));
        assert_eq!(CalendarPage::default().terminal_id(), None);
    }

    #[test]
    fn test_calendar_kind_parse() {
        assert_eq!("Holiday".parse::<CalendarKind>().unwrap(), CalendarKind::Holidays);
        assert!("dividends".parse::<CalendarKind>().is_err());
    }
}
