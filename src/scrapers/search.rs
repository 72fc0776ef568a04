use crate::errors::{Result, ScraperError};
use crate::models::market::QuoteResult;
use serde::Deserialize;
use serde_json::Value;

/// SearchInnerPage 每页返回的最大条数
pub const SEARCH_PAGE_SIZE: u64 = 270;

/// 过滤名称与上游 pair_type 的对应关系
const QUOTE_FILTERS: [(&str, &str); 10] = [
    ("indices", "indice"),
    ("stocks", "equities"),
    ("etfs", "etf"),
    ("funds", "fund"),
    ("commodities", "commodity"),
    ("currencies", "currency"),
    ("cryptos", "crypto"),
    ("bonds", "bond"),
    ("certificates", "certificate"),
    ("fxfutures", "fxfuture"),
];

// flag 名称不能直接转换成国家名的特例
const FLAG_COUNTRIES: [(&str, &str); 5] = [
    ("Europe", "euro zone"),
    ("UK", "united kingdom"),
    ("USA", "united states"),
    ("Russian_Federation", "russia"),
    ("Cote_dIvoire", "ivory coast"),
];

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    total: SearchTotal,
    #[serde(default)]
    quotes: Vec<RawQuote>,
}

#[derive(Debug, Deserialize)]
struct SearchTotal {
    #[serde(default)]
    quotes: u64,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(rename = "pairId")]
    pair_id: Value,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    flag: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    pair_type: String,
    #[serde(default)]
    exchange: String,
}

/// 一页搜索结果
#[derive(Debug, Clone, PartialEq)]
pub struct QuotePage {
    pub total: u64,
    pub quotes: Vec<QuoteResult>,
}

/// 把过滤名称 (stocks、etfs 等) 转换成上游的 pair_type
pub fn pair_type_filter(filter: &str) -> Result<&'static str> {
    let wanted = filter.trim().to_lowercase();
    QUOTE_FILTERS
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, pair_type)| *pair_type)
        .ok_or_else(|| {
            let names: Vec<_> = QUOTE_FILTERS.iter().map(|(name, _)| *name).collect();
            ScraperError::Validation(format!(
                "unknown search filter '{}', available: {}",
                filter,
                names.join(", ")
            ))
        })
}

/// 上游的 flag 名称 (South_Korea、USA) 转换为小写国家名
pub fn flag_country(flag: &str) -> String {
    FLAG_COUNTRIES
        .iter()
        .find(|(name, _)| *name == flag)
        .map(|(_, country)| country.to_string())
        .unwrap_or_else(|| flag.replace('_', " ").to_lowercase())
}

// "/equities/apple-computer-inc" -> "apple-computer-inc"
fn quote_tag(link: &str) -> String {
    let trimmed = link.trim().trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((_, tag)) => tag.to_string(),
        None => trimmed.to_string(),
    }
}

fn quote_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn parse_quote_page(body: &str) -> Result<QuotePage> {
    let envelope: SearchEnvelope = serde_json::from_str(body)?;

    let quotes = envelope
        .quotes
        .into_iter()
        .map(|quote| {
            let id = quote_id(&quote.pair_id)
                .ok_or_else(|| ScraperError::parse("pairId", format!("'{}' is not a valid id", quote.pair_id)))?;
            Ok(QuoteResult {
                id,
                country: flag_country(&quote.flag),
                tag: quote_tag(&quote.link),
                name: quote.name,
                symbol: quote.symbol,
                pair_type: quote.pair_type,
                exchange: quote.exchange,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QuotePage {
        total: envelope.total.quotes,
        quotes,
    })
}
