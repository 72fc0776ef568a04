use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, ScraperError};
use crate::util;

/// 概览表中的一行，fields 的列随产品类别变化（last、high、change_percentage 等）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewRow {
    pub id: u64,
    pub name: String,
    pub country: Option<String>,
    pub symbol: Option<String>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// 技术分析的时间周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnicalInterval {
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FiveHours,
    Daily,
    Weekly,
    Monthly,
}

impl TechnicalInterval {
    pub const ALL: [TechnicalInterval; 8] = [
        TechnicalInterval::FiveMinutes,
        TechnicalInterval::FifteenMinutes,
        TechnicalInterval::ThirtyMinutes,
        TechnicalInterval::OneHour,
        TechnicalInterval::FiveHours,
        TechnicalInterval::Daily,
        TechnicalInterval::Weekly,
        TechnicalInterval::Monthly,
    ];

    /// GetTechincalData 表单中的 period 值，按日及以内为秒数
    pub fn as_form_value(&self) -> &'static str {
        match self {
            TechnicalInterval::FiveMinutes => "300",
            TechnicalInterval::FifteenMinutes => "900",
            TechnicalInterval::ThirtyMinutes => "1800",
            TechnicalInterval::OneHour => "3600",
            TechnicalInterval::FiveHours => "18000",
            TechnicalInterval::Daily => "86400",
            TechnicalInterval::Weekly => "week",
            TechnicalInterval::Monthly => "month",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TechnicalInterval::FiveMinutes => "5mins",
            TechnicalInterval::FifteenMinutes => "15mins",
            TechnicalInterval::ThirtyMinutes => "30mins",
            TechnicalInterval::OneHour => "1hour",
            TechnicalInterval::FiveHours => "5hours",
            TechnicalInterval::Daily => "daily",
            TechnicalInterval::Weekly => "weekly",
            TechnicalInterval::Monthly => "monthly",
        }
    }
}

impl Default for TechnicalInterval {
    fn default() -> Self {
        TechnicalInterval::Daily
    }
}

impl FromStr for TechnicalInterval {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|interval| interval.as_str() == wanted)
            .ok_or_else(|| {
                let available: Vec<_> = Self::ALL.iter().map(|i| i.as_str()).collect();
                ScraperError::Validation(format!(
                    "unknown interval '{}', available values are: {}",
                    s,
                    available.join(", ")
                ))
            })
    }
}

impl fmt::Display for TechnicalInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalIndicator {
    pub name: String,
    pub value: f64,
    /// buy、sell、neutral、overbought 等，空格替换为下划线
    pub signal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovingAverage {
    pub period: u32,
    pub sma_value: f64,
    pub sma_signal: String,
    pub ema_value: f64,
    pub ema_signal: String,
}

/// 一种枢轴点算法（Classic、Fibonacci 等）的各个价位，键来自表头，例如 s1、pivot_points、r1
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotPoint {
    pub name: String,
    pub levels: BTreeMap<String, Option<f64>>,
}

/// 全站搜索返回的一条行情
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteResult {
    pub id: u64,
    pub name: String,
    pub symbol: String,
    pub country: String,
    pub tag: String,
    pub pair_type: String,
    pub exchange: String,
}

/// 分红频率，对应 data-value 1 到 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendKind {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
    TrailingTwelveMonths,
}

impl DividendKind {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(DividendKind::Monthly),
            "2" => Some(DividendKind::Quarterly),
            "3" => Some(DividendKind::SemiAnnual),
            "4" => Some(DividendKind::Annual),
            "5" => Some(DividendKind::TrailingTwelveMonths),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dividend {
    #[serde(serialize_with = "util::serialize_dmy")]
    pub date: NaiveDate,
    pub dividend: f64,
    #[serde(rename = "type")]
    pub kind: Option<DividendKind>,
    #[serde(serialize_with = "util::serialize_opt_dmy")]
    pub payment_date: Option<NaiveDate>,
    /// 百分比数值，4.51% 记为 4.51
    #[serde(rename = "yield")]
    pub dividend_yield: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyProfile {
    pub url: String,
    pub description: Option<String>,
}
