use crate::config::FilterTables;
use crate::errors::{Result, ScraperError};
use crate::models::calendar::{CalendarKind, CalendarPage, RawCalendarRow};
use crate::scrapers::selector;
use crate::util;
use chrono::NaiveDate;
use log::debug;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use std::collections::BTreeMap;

const EARNINGS_DIVIDER_FORMAT: &str = "%A, %B %d, %Y";
const HOLIDAY_DATE_FORMAT: &str = "%b %d, %Y";
const MISSING_VALUE: &str = "--";

/// getCalendarFilteredData 返回的 JSON 外壳
#[derive(Debug, Deserialize)]
struct CalendarEnvelope {
    data: String,
    #[serde(default)]
    bind_scroll_handler: Option<bool>,
    #[serde(default)]
    last_time_scope: Option<serde_json::Value>,
}

/// 解析一页日历响应：先拆 JSON 外壳，再按日历类型解析其中的 HTML 行。
/// carried_date 为之前各页最后一个显式日期，节假日行标识需要它
pub fn parse_calendar_page(
    kind: CalendarKind,
    body: &str,
    tables: &FilterTables,
    carried_date: Option<NaiveDate>,
) -> Result<CalendarPage> {
    let envelope: CalendarEnvelope = serde_json::from_str(body)?;

    let rows = match kind {
        CalendarKind::Economic => parse_economic_rows(&envelope.data, tables)?,
        CalendarKind::Earnings => parse_earnings_rows(&envelope.data)?,
        CalendarKind::Holidays => parse_holiday_rows(&envelope.data, carried_date)?,
    };

    let continuation = match envelope.last_time_scope {
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    };

    debug!("{} calendar page: {} rows, has_more={:?}", kind, rows.len(), envelope.bind_scroll_handler);

    Ok(CalendarPage {
        rows,
        has_more: envelope.bind_scroll_handler,
        continuation,
    })
}

// 上游只返回 <tr> 片段，需要包进 table 才能被 html5ever 保留
fn parse_rows_fragment(html: &str) -> Html {
    Html::parse_fragment(&format!("<table><tbody>{}</tbody></table>", html))
}

fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn insert_present(fields: &mut BTreeMap<String, String>, key: &str, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        fields.insert(key.to_string(), value);
    }
}

/// 经济日历。theDay 行给出后续事件的日期
pub fn parse_economic_rows(html: &str, tables: &FilterTables) -> Result<Vec<RawCalendarRow>> {
    let document = parse_rows_fragment(html);
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;
    let span_selector = selector("span")?;

    let mut current_date: Option<NaiveDate> = None;
    let mut rows = Vec::new();

    for row in document.select(&row_selector) {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();

        let id = match row.value().attr("id").and_then(|id| id.strip_prefix("eventRowId_")) {
            Some(id) => id.to_string(),
            None => {
                if let Some(epoch) = cells
                    .first()
                    .and_then(|cell| cell.value().attr("id"))
                    .and_then(|id| id.strip_prefix("theDay"))
                {
                    current_date = Some(util::epoch_to_date(epoch, &chrono_tz::UTC)?);
                }
                continue;
            }
        };

        let actual_id = format!("eventActual_{}", id);
        let forecast_id = format!("eventForecast_{}", id);
        let previous_id = format!("eventPrevious_{}", id);
        let mut fields = BTreeMap::new();

        for cell in &cells {
            let class = cell.value().attr("class").unwrap_or_default();
            let cell_id = cell.value().attr("id").unwrap_or_default();

            if class.contains("first left") {
                insert_present(&mut fields, "time", Some(text_of(cell)));
            } else if class.contains("flagCur") {
                let zone = cell
                    .select(&span_selector)
                    .next()
                    .and_then(|span| span.value().attr("title"))
                    .map(|title| title.trim().to_lowercase());
                insert_present(&mut fields, "zone", zone);
                insert_present(&mut fields, "currency", Some(text_of(cell)));
            } else if class.contains("sentiment") {
                let importance = match cell.value().attr("data-img_key") {
                    Some(key) => {
                        let rating = key.trim_start_matches("bull").parse::<u32>().map_err(|e| {
                            ScraperError::parse("importance", format!("'{}': {}", key, e))
                        })?;
                        tables.importance_label(rating).map(str::to_string)
                    }
                    None => None,
                };
                insert_present(&mut fields, "importance", importance);
            } else if class == "left event" {
                insert_present(&mut fields, "event", Some(text_of(cell)));
            } else if cell_id == actual_id {
                insert_present(&mut fields, "actual", Some(text_of(cell)));
            } else if cell_id == forecast_id {
                insert_present(&mut fields, "forecast", Some(text_of(cell)));
            } else if cell_id == previous_id {
                insert_present(&mut fields, "previous", Some(text_of(cell)));
            }
        }

        rows.push(RawCalendarRow {
            id,
            date: current_date,
            fields,
        });
    }

    Ok(rows)
}

fn earnings_number(text: &str, field: &str) -> Result<Option<String>> {
    let text = text.replace("/\u{a0}\u{a0}", "");
    let text = text.trim();
    if text.is_empty() || text == MISSING_VALUE {
        return Ok(None);
    }
    util::expand_abbreviation(text, field).map(Some)
}

// 日期分隔行：tr 或其首个 td 带 tablesorterdivider，或只有一个 td.theDay 单元格
fn is_earnings_divider(row: &ElementRef, cells: &[ElementRef]) -> bool {
    if row.value().attr("tablesorterdivider").is_some() {
        return true;
    }
    match cells {
        [] => false,
        [only] if only.value().classes().any(|class| class == "theDay") => true,
        [first, ..] => first.value().attr("tablesorterdivider").is_some(),
    }
}

/// 财报日历。日期分隔行给出后续公司的日期
pub fn parse_earnings_rows(html: &str) -> Result<Vec<RawCalendarRow>> {
    let document = parse_rows_fragment(html);
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;
    let span_selector = selector("span")?;
    let link_selector = selector("a")?;

    let mut current_date: Option<NaiveDate> = None;
    let mut rows = Vec::new();

    for row in document.select(&row_selector) {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();

        if is_earnings_divider(&row, &cells) {
            if let Some(cell) = cells.first() {
                let text = text_of(cell);
                current_date = Some(
                    NaiveDate::parse_from_str(&text, EARNINGS_DIVIDER_FORMAT)
                        .map_err(|e| ScraperError::parse("date", format!("'{}': {}", text, e)))?,
                );
            }
            continue;
        }

        // 无数据提示行等，没有公司单元格
        let company_cell = match cells.get(1) {
            Some(cell) if cell.value().attr("_p_pid").is_some() => cell,
            _ => continue,
        };
        if cells.len() < 8 {
            return Err(ScraperError::parse(
                "row",
                format!("earnings row has {} cells, expected 8", cells.len()),
            ));
        }

        let id = format!(
            "{}{}",
            company_cell.value().attr("_p_pid").unwrap_or_default(),
            company_cell.value().attr("_r_pid").unwrap_or_default()
        );

        let mut fields = BTreeMap::new();
        let zone = cells[0]
            .select(&span_selector)
            .next()
            .and_then(|span| span.value().attr("title"))
            .map(|title| title.trim().to_lowercase());
        insert_present(&mut fields, "zone", zone);
        insert_present(
            &mut fields,
            "company_name",
            company_cell.select(&span_selector).next().map(|span| text_of(&span)),
        );
        insert_present(
            &mut fields,
            "ticker",
            company_cell.select(&link_selector).next().map(|link| text_of(&link)),
        );
        insert_present(&mut fields, "eps_actual", earnings_number(&text_of(&cells[2]), "eps_actual")?);
        insert_present(&mut fields, "eps_forecast", earnings_number(&text_of(&cells[3]), "eps_forecast")?);
        insert_present(&mut fields, "rev_actual", earnings_number(&text_of(&cells[4]), "rev_actual")?);
        insert_present(&mut fields, "rev_forecast", earnings_number(&text_of(&cells[5]), "rev_forecast")?);
        insert_present(&mut fields, "mkt_cap", earnings_number(&text_of(&cells[6]), "mkt_cap")?);
        insert_present(
            &mut fields,
            "time",
            cells[7]
                .select(&span_selector)
                .next()
                .and_then(|span| span.value().attr("data-tooltip"))
                .map(|tooltip| tooltip.trim().to_string()),
        );

        rows.push(RawCalendarRow {
            id,
            date: current_date,
            fields,
        });
    }

    Ok(rows)
}

/// 节假日日历。同一天的后续行日期单元格为空，行的 date 留空由分页时补全；
/// 行标识使用补全后的日期，页首的空日期行沿用 carried_date
pub fn parse_holiday_rows(html: &str, carried_date: Option<NaiveDate>) -> Result<Vec<RawCalendarRow>> {
    let document = parse_rows_fragment(html);
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;

    let mut last_date = carried_date;
    let mut rows = Vec::new();

    for row in document.select(&row_selector) {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        if cells.len() < 4 {
            continue;
        }

        let date_text = text_of(&cells[0]);
        let date = if date_text.is_empty() {
            None
        } else {
            Some(
                NaiveDate::parse_from_str(&date_text, HOLIDAY_DATE_FORMAT)
                    .map_err(|e| ScraperError::parse("date", format!("'{}': {}", date_text, e)))?,
            )
        };
        if date.is_some() {
            last_date = date;
        }

        let country = text_of(&cells[1]);
        let exchange_name = text_of(&cells[2]);
        let id_date = last_date
            .map(|d| d.format(HOLIDAY_DATE_FORMAT).to_string())
            .unwrap_or_default();
        let id = format!("{}|{}|{}", id_date, country, exchange_name);

        let mut fields = BTreeMap::new();
        insert_present(&mut fields, "country", Some(country));
        insert_present(&mut fields, "exchange_name", Some(exchange_name));
        insert_present(&mut fields, "description", Some(text_of(&cells[3])));

        rows.push(RawCalendarRow { id, date, fields });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    const ECONOMIC_ROWS: &str = r#"
        <tr><td colspan="9" class="theDay" id="theDay1577836800">Wednesday, January 1, 2020</td></tr>
        <tr id="eventRowId_411394" event_attr_id="1057">
          <td class="first left time js-time">All Day</td>
          <td class="left flagCur noWrap"><span title="United States" class="ceFlags USA"></span> USD</td>
          <td class="left textNum sentiment noWrap" data-img_key="bull3"><i></i></td>
          <td class="left event">New Year's Day</td>
          <td class="bold act blackFont event-411394-actual" id="eventActual_411394">1.2%</td>
          <td class="fore event-411394-forecast" id="eventForecast_411394">&nbsp;</td>
          <td class="prev event-411394-previous" id="eventPrevious_411394">0.9%</td>
        </tr>
        <tr id="eventRowId_411400">
          <td class="first left time js-time">08:30</td>
          <td class="left flagCur noWrap"><span title="Euro Zone" class="ceFlags Europe"></span> EUR</td>
          <td class="left textNum sentiment noWrap"></td>
          <td class="left event">Manufacturing PMI</td>
        </tr>"#;

    #[test]
    fn test_parse_economic_rows() {
        let rows = parse_economic_rows(ECONOMIC_ROWS, &FilterTables::default()).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.id, "411394");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(first.fields["time"], "All Day");
        assert_eq!(first.fields["zone"], "united states");
        assert_eq!(first.fields["currency"], "USD");
        assert_eq!(first.fields["importance"], "high");
        assert_eq!(first.fields["event"], "New Year's Day");
        assert_eq!(first.fields["actual"], "1.2%");
        assert_eq!(first.fields["previous"], "0.9%");
        // &nbsp; 视为缺失
        assert!(!first.fields.contains_key("forecast"));

        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert!(!rows[1].fields.contains_key("importance"));
    }

    #[test]
    fn test_parse_earnings_rows() {
        let html = r#"
            <tr><td colspan="9" class="theDay" tablesorterdivider="">Thursday, January 16, 2020</td></tr>
            <tr>
              <td class="flag"><span title="United States" class="ceFlags USA"></span></td>
              <td class="left noWrap earnCalCompany" _p_pid="20591" _r_pid="1120">
                <span class="earnCalCompanyName">Morgan Stanley</span>(<a href="/equities/morgan-stanley">MS</a>)
              </td>
              <td class="eps_actual">1.30</td>
              <td class="leftStrong">/&nbsp;&nbsp;1.18</td>
              <td class="rev_actual">10.5B</td>
              <td class="leftStrong">/&nbsp;&nbsp;10.3B</td>
              <td class="right">91.75B</td>
              <td class="right time"><span class="marketOpen genToolTip" data-tooltip="Before market open"></span></td>
            </tr>
            <tr>
              <td class="flag"><span title="Japan" class="ceFlags Japan"></span></td>
              <td class="left noWrap earnCalCompany" _p_pid="44" _r_pid="7">
                <span class="earnCalCompanyName">Tiny Corp</span>(<a href="/equities/tiny">TNY</a>)
              </td>
              <td class="eps_actual">--</td>
              <td class="leftStrong">/&nbsp;&nbsp;--</td>
              <td class="rev_actual">--</td>
              <td class="leftStrong">/&nbsp;&nbsp;--</td>
              <td class="right"></td>
              <td class="right time"><span></span></td>
            </tr>"#;

        let rows = parse_earnings_rows(html).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.date == NaiveDate::from_ymd_opt(2020, 1, 16)));

        let ms = &rows[0];
        assert_eq!(ms.id, "205911120");
        assert_eq!(ms.date, NaiveDate::from_ymd_opt(2020, 1, 16));
        assert_eq!(ms.fields["zone"], "united states");
        assert_eq!(ms.fields["company_name"], "Morgan Stanley");
        assert_eq!(ms.fields["ticker"], "MS");
        assert_eq!(ms.fields["eps_actual"], "1.3");
        assert_eq!(ms.fields["eps_forecast"], "1.18");
        assert_eq!(ms.fields["rev_actual"], "10500000000");
        assert_eq!(ms.fields["mkt_cap"], "91750000000");
        assert_eq!(ms.fields["time"], "Before market open");

        let tiny = &rows[1];
        assert_eq!(tiny.id, "447");
        assert!(!tiny.fields.contains_key("eps_actual"));
        assert!(!tiny.fields.contains_key("rev_forecast"));
        assert!(!tiny.fields.contains_key("mkt_cap"));
        assert!(!tiny.fields.contains_key("time"));
    }

    #[test]
    fn test_earnings_divider_on_row_or_single_day_cell() {
        let company = r#"
            <tr>
              <td class="flag"><span title="Spain" class="ceFlags Spain"></span></td>
              <td class="left noWrap earnCalCompany" _p_pid="26490" _r_pid="1"><span>BBVA</span>(<a href="/equities/bbva">BBVA</a>)</td>
              <td>0.25</td><td>/&nbsp;&nbsp;0.24</td><td>6.2B</td><td>/&nbsp;&nbsp;6.1B</td><td>30.01B</td><td><span></span></td>
            </tr>"#;
        let on_row = format!(
            r#"<tr tablesorterdivider=""><td colspan="9">Friday, January 31, 2020</td></tr>{}"#,
            company
        );
        let single_day = format!(r#"<tr><td class="theDay">Monday, February 3, 2020</td></tr>{}"#, company);

        let rows = parse_earnings_rows(&on_row).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2020, 1, 31));
        assert_eq!(rows[0].fields["mkt_cap"], "30010000000");

        let rows = parse_earnings_rows(&single_day).unwrap();
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2020, 2, 3));
    }

    #[test]
    fn test_parse_holiday_rows_inherit_blank_dates() {
        let html = r#"
            <tr><td class="date bold center">Jan 01, 2021</td><td class="bold cur"><span class="ceFlags Argentina"></span><a href="/holiday-calendar">Argentina</a></td><td>Buenos Aires</td><td class="last">New Year's Day</td></tr>
            <tr><td class="date bold center"></td><td class="bold cur"><a href="/holiday-calendar">Australia</a></td><td>Sydney</td><td class="last">New Year's Day</td></tr>"#;

        let rows = parse_holiday_rows(html, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(rows[0].fields["country"], "Argentina");
        assert_eq!(rows[0].fields["exchange_name"], "Buenos Aires");
        assert_eq!(rows[1].date, None);
        assert_eq!(rows[1].id, "Jan 01, 2021|Australia|Sydney");
    }

    #[test]
    fn test_holiday_ids_use_carried_date_at_page_start() {
        let html = r#"
            <tr><td class="date bold center"></td><td class="bold cur"><a href="/holiday-calendar">Brazil</a></td><td>Sao Paulo</td><td class="last">Carnival</td></tr>
            <tr><td class="date bold center">Feb 17, 2021</td><td class="bold cur"><a href="/holiday-calendar">Brazil</a></td><td>Sao Paulo</td><td class="last">Ash Wednesday</td></tr>"#;

        let rows = parse_holiday_rows(html, NaiveDate::from_ymd_opt(2021, 2, 16)).unwrap();
        assert_eq!(rows[0].date, None);
        assert_eq!(rows[0].id, "Feb 16, 2021|Brazil|Sao Paulo");
        assert_eq!(rows[1].id, "Feb 17, 2021|Brazil|Sao Paulo");

        // 同一页内容在不同的承接日期下得到不同的标识
        let other = parse_holiday_rows(html, NaiveDate::from_ymd_opt(2021, 2, 15)).unwrap();
        assert_ne!(other[0].id, rows[0].id);
    }

    #[test]
    fn test_parse_calendar_page_envelope() {
        let body = serde_json::json!({
            "data": ECONOMIC_ROWS,
            "bind_scroll_handler": true,
            "last_time_scope": 1577923200,
        })
        .to_string();

        let page = parse_calendar_page(CalendarKind::Economic, &body, &FilterTables::default(), None).unwrap();
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.has_more, Some(true));
        assert_eq!(page.continuation.as_deref(), Some("1577923200"));
        assert_eq!(page.terminal_id(), Some("411400"));
    }

    #[test]
    fn test_invalid_envelope_is_parse_error() {
        let err = parse_calendar_page(CalendarKind::Earnings, "<html>", &FilterTables::default(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
