use crate::errors::{Result, ScraperError};
use crate::models::market::{CompanyProfile, Dividend, DividendKind, OverviewRow};
use crate::scrapers::selector;
use crate::util;
use chrono::NaiveDate;
use log::debug;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

const INFO_DATE_FORMATS: [&str; 2] = ["%b %d, %Y", "%d %b %Y"];

/// 把页面上的单元格文本转成 JSON 值：数字、dd/mm/yyyy 日期、K/M/B/T 缩写，其余保留原文
pub fn cell_value(text: &str) -> Value {
    let text = text.trim();
    if text.is_empty() || text == "N/A" || text == "-" || text == "--" {
        return Value::Null;
    }

    if let Some(number) = number_value(&util::strip_thousands(text)) {
        return number;
    }

    for format in INFO_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Value::String(util::format_dmy(&date));
        }
    }

    if text.ends_with(|c: char| matches!(c, 'K' | 'M' | 'B' | 'T')) {
        if let Some(number) = util::expand_abbreviation(text, "value")
            .ok()
            .and_then(|expanded| number_value(&expanded))
        {
            return number;
        }
    }

    Value::String(text.to_string())
}

fn number_value(text: &str) -> Option<Value> {
    text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

// 下一个兄弟元素，跳过文本节点
fn next_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// 解析产品页面的概要信息块 (div.overviewDataTable)，name_key 对应的值由调用方给出
pub fn parse_information(html: &str, name_key: &str, name_value: &str) -> Result<BTreeMap<String, Value>> {
    let document = Html::parse_document(html);
    let item_selector = selector("div.overviewDataTable > div")?;
    let title_selector = selector("span.float_lang_base_1")?;

    let mut info = BTreeMap::new();
    for item in document.select(&item_selector) {
        let title = match item.select(&title_selector).next() {
            Some(title) => title,
            None => continue,
        };
        let mut key = text_of(&title);
        if key == "Day's Range" {
            key = "Todays Range".to_string();
        }
        let value = next_element(&title).map(|value| cell_value(&text_of(&value))).unwrap_or(Value::Null);
        info.insert(key, value);
    }

    if info.is_empty() {
        return Err(ScraperError::parse("information", "overview data table not found in page"));
    }

    info.insert(name_key.to_string(), Value::String(name_value.to_string()));
    Ok(info)
}

fn overview_field(suffix: &str) -> &str {
    match suffix {
        "pc" => "change",
        "pcp" => "change_percentage",
        other => other,
    }
}

/// 解析按国家的概览表，最多返回 n_results 行
pub fn parse_overview(html: &str, table_css: &str, n_results: usize) -> Result<Vec<OverviewRow>> {
    let document = Html::parse_document(html);
    let table_selector = selector(table_css)?;
    let row_selector = selector("tbody tr")?;
    let cell_selector = selector("td")?;
    let flag_selector = selector("td.flag span")?;
    let name_selector = selector("td.elp a, td.bold a, a")?;
    let symbol_selector = selector("td.symbol")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| ScraperError::parse("table", format!("overview table {} not found in page", table_css)))?;

    let mut rows = Vec::new();
    for row in table.select(&row_selector) {
        if rows.len() >= n_results {
            break;
        }

        let id = match row.value().attr("id").and_then(|id| id.strip_prefix("pair_")) {
            Some(id) => id.trim(),
            None => {
                debug!("skipping overview row without pair id");
                continue;
            }
        };
        let numeric_id = id
            .parse::<u64>()
            .map_err(|e| ScraperError::parse("id", format!("'{}': {}", id, e)))?;

        let name = row
            .select(&name_selector)
            .next()
            .map(|a| text_of(&a))
            .ok_or_else(|| ScraperError::parse("name", format!("overview row {} has no name", id)))?;
        let country = row
            .select(&flag_selector)
            .next()
            .and_then(|span| span.value().attr("title"))
            .map(|title| title.trim().to_lowercase());
        let symbol = row
            .select(&symbol_selector)
            .next()
            .and_then(|cell| cell.value().attr("title").map(str::to_string).or_else(|| Some(text_of(&cell))))
            .filter(|symbol| !symbol.is_empty());

        let prefix = format!("pid-{}-", id);
        let mut fields = BTreeMap::new();
        for cell in row.select(&cell_selector) {
            let suffix = match cell.value().classes().find_map(|class| class.strip_prefix(prefix.as_str())) {
                Some(suffix) => suffix,
                None => continue,
            };
            let mut text = text_of(&cell);
            if suffix == "pcp" {
                text = text.trim_end_matches('%').trim_start_matches('+').to_string();
            }
            fields.insert(overview_field(suffix).to_string(), cell_value(&text));
        }

        rows.push(OverviewRow {
            id: numeric_id,
            name,
            country,
            symbol,
            fields,
        });
    }

    Ok(rows)
}

/// 分红页面首屏的数据
#[derive(Debug, Clone, PartialEq)]
pub struct DividendPage {
    /// 表格 id 中的 pairID，翻页时回传
    pub pair_id: String,
    pub rows: Vec<Dividend>,
    pub last_timestamp: Option<String>,
}

/// MoreDividendsHistory 的一次响应
#[derive(Debug, Clone, PartialEq)]
pub struct MoreDividends {
    /// None 表示上游没有给出 hasMoreHistory
    pub has_more: Option<bool>,
    pub rows: Vec<Dividend>,
    pub last_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoreDividendsEnvelope {
    #[serde(rename = "hasMoreHistory", default)]
    has_more_history: Option<Value>,
    #[serde(rename = "historyRows", default)]
    history_rows: Option<String>,
}

/// 页面中没有分红表时返回 None
pub fn parse_dividends_page(html: &str) -> Result<Option<DividendPage>> {
    let document = Html::parse_document(html);
    let table_selector = selector("table[id^=\"dividendsHistoryData\"]")?;
    let row_selector = selector("tbody tr")?;

    let table = match document.select(&table_selector).next() {
        Some(table) => table,
        None => return Ok(None),
    };
    let pair_id = table
        .value()
        .attr("id")
        .and_then(|id| id.strip_prefix("dividendsHistoryData"))
        .unwrap_or_default()
        .to_string();
    if pair_id.is_empty() {
        return Err(ScraperError::parse("dividends", "dividends table id has no pair id"));
    }

    let (rows, last_timestamp) = dividend_rows(table.select(&row_selector))?;
    Ok(Some(DividendPage {
        pair_id,
        rows,
        last_timestamp,
    }))
}

pub fn parse_more_dividends(body: &str) -> Result<MoreDividends> {
    let envelope: MoreDividendsEnvelope = serde_json::from_str(body)?;
    let has_more = match envelope.has_more_history {
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::Number(n)) => Some(n.as_i64() != Some(0)),
        Some(Value::String(s)) => Some(s == "1" || s.eq_ignore_ascii_case("true")),
        _ => None,
    };

    let html = envelope.history_rows.unwrap_or_default();
    let fragment = Html::parse_fragment(&format!("<table><tbody>{}</tbody></table>", html));
    let row_selector = selector("tr")?;
    let (rows, last_timestamp) = dividend_rows(fragment.select(&row_selector))?;

    Ok(MoreDividends {
        has_more,
        rows,
        last_timestamp,
    })
}

fn dividend_rows<'a>(rows: impl Iterator<Item = ElementRef<'a>>) -> Result<(Vec<Dividend>, Option<String>)> {
    let cell_selector = selector("td")?;
    let mut dividends = Vec::new();
    let mut last_timestamp = None;

    for row in rows {
        if let Some(ts) = row.value().attr("event_timestamp") {
            last_timestamp = Some(ts.trim().to_string());
        }
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        if let Some(dividend) = dividend_row(&cells)? {
            dividends.push(dividend);
        }
    }

    Ok((dividends, last_timestamp))
}

fn dividend_row(cells: &[ElementRef]) -> Result<Option<Dividend>> {
    let mut date = None;
    let mut value = None;
    let mut kind = None;
    let mut payment_date = None;
    let mut dividend_yield = None;

    for (i, cell) in cells.iter().enumerate() {
        let data_value = cell.value().attr("data-value");

        if cell.value().classes().any(|class| class == "first") {
            let epoch = data_value.ok_or_else(|| ScraperError::parse("date", "dividend date cell has no data-value"))?;
            date = Some(util::epoch_to_date(epoch, &chrono_tz::UTC)?);
            if let Some(next) = cells.get(i + 1) {
                value = Some(util::parse_price(&text_of(next), "dividend")?);
            }
        }

        if let Some(code) = data_value.and_then(DividendKind::from_code) {
            kind = Some(code);
            payment_date = cells
                .get(i + 1)
                .and_then(|next| next.value().attr("data-value"))
                .and_then(|epoch| util::epoch_to_date(epoch, &chrono_tz::UTC).ok());
            dividend_yield = cells.get(i + 2).and_then(|cell| {
                util::strip_thousands(text_of(cell).trim_end_matches('%'))
                    .parse::<f64>()
                    .ok()
            });
        }
    }

    match (date, value) {
        (Some(date), Some(dividend)) => Ok(Some(Dividend {
            date,
            dividend,
            kind,
            payment_date,
            dividend_yield,
        })),
        _ => Ok(None),
    }
}

/// 公司简介页；没有简介文本时 description 为 None
pub fn parse_company_profile(html: &str, url: &str) -> Result<CompanyProfile> {
    let document = Html::parse_document(html);
    let story_selector = selector("#profile-fullStory-showhide")?;

    let description = document
        .select(&story_selector)
        .next()
        .map(|story| story.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty());

    Ok(CompanyProfile {
        url: url.to_string(),
        description,
    })
}
