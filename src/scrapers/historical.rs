use crate::errors::{Result, ScraperError};
use crate::scrapers::selector;
use scraper::Html;

/// 历史行情表中的一行，尚未做类型转换
#[derive(Debug, Clone, PartialEq)]
pub struct RawPriceRow {
    /// 第一个单元格的文本，用于识别 "No results found" 哨兵行
    pub first_text: String,
    /// 每个单元格的 data-real-value，按 时间戳, 收盘, 开盘, 最高, 最低, [成交量] 排列
    pub cells: Vec<Option<String>>,
}

/// 从 HistoricalDataAjax 的响应中提取结果表的所有行。
/// 找不到结果表或结果表没有行都视为解析错误，空响应体由调用方提前处理。
pub fn extract_price_rows(html: &str) -> Result<Vec<RawPriceRow>> {
    let document = Html::parse_document(html);
    let table_selector = selector("table#curr_table")?;
    let row_selector = selector("tbody tr")?;
    let cell_selector = selector("td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| ScraperError::parse("table", "historical results table not found in response"))?;

    let rows: Vec<RawPriceRow> = table
        .select(&row_selector)
        .map(|row| {
            let cells: Vec<_> = row.select(&cell_selector).collect();
            let first_text = cells
                .first()
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let values = cells
                .iter()
                .map(|cell| cell.value().attr("data-real-value").map(|v| v.trim().to_string()))
                .collect();

            RawPriceRow {
                first_text,
                cells: values,
            }
        })
        .collect();

    if rows.is_empty() {
        return Err(ScraperError::parse("table", "historical results table has no rows"));
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_extract_rows_with_real_values() {
        let html = r#"
            <table id="curr_table"><tbody>
              <tr>
                <td data-real-value="1578009600">Jan 03, 2020</td>
                <td data-real-value="4.563">4.563</td>
                <td data-real-value="4.600">4.600</td>
                <td data-real-value="4.615">4.615</td>
                <td data-real-value="4.527">4.527</td>
                <td data-real-value="28,145,000">28.15M</td>
                <td>-0.75%</td>
              </tr>
            </tbody></table>"#;

        let rows = extract_price_rows(html).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].first_text, "Jan 03, 2020");
        assert_eq!(rows[0].cells[0].as_deref(), Some("1578009600"));
        assert_eq!(rows[0].cells[5].as_deref(), Some("28,145,000"));
        assert_eq!(rows[0].cells[6], None);
    }

    #[test]
    fn test_extract_sentinel_row() {
        let html = r#"<table id="curr_table"><tbody><tr><td colspan="7">No results found</td></tr></tbody></table>"#;

        let rows = extract_price_rows(html).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].first_text, "No results found");
    }

    #[test]
    fn test_missing_table_is_parse_error() {
        let err = extract_price_rows("<div>maintenance</div>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_empty_table_reports_no_rows() {
        let err = extract_price_rows(r#"<table id="curr_table"><tbody></tbody></table>"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("has no rows"));
    }
}
