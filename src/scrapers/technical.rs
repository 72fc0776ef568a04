use crate::errors::{Result, ScraperError};
use crate::models::market::{MovingAverage, PivotPoint, TechnicalIndicator};
use crate::scrapers::selector;
use crate::util;
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;

// GetTechincalData 响应中的三张表
const INDICATORS_TABLE: &str = "table.technicalIndicatorsTbl";
const MOVING_AVERAGES_TABLE: &str = "table.movingAvgsTbl";
const PIVOT_POINTS_TABLE: &str = "table.crossRatesTbl";

fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn has_class(cell: &ElementRef, class: &str) -> bool {
    cell.value().classes().any(|c| c == class)
}

fn signal_text(text: &str) -> String {
    text.trim().to_lowercase().replace(' ', "_")
}

fn table_rows<'a>(document: &'a Html, table_css: &str) -> Result<Vec<Vec<ElementRef<'a>>>> {
    let table_selector = selector(table_css)?;
    let row_selector = selector("tbody tr")?;
    let cell_selector = selector("td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| ScraperError::parse("table", format!("{} not found in technical data", table_css)))?;

    Ok(table
        .select(&row_selector)
        .map(|row| row.select(&cell_selector).collect())
        .collect())
}

/// RSI、MACD 等技术指标：名称单元格 (td.symbol) 之后依次是数值和信号
pub fn parse_technical_indicators(html: &str) -> Result<Vec<TechnicalIndicator>> {
    let document = Html::parse_document(html);
    let mut indicators = Vec::new();

    for cells in table_rows(&document, INDICATORS_TABLE)? {
        let position = match cells.iter().position(|cell| has_class(cell, "symbol")) {
            Some(position) => position,
            None => continue,
        };
        let name = text_of(&cells[position]);
        let (value, signal) = match (cells.get(position + 1), cells.get(position + 2)) {
            (Some(value), Some(signal)) => (value, signal),
            _ => return Err(ScraperError::parse("indicator", format!("{} row is incomplete", name))),
        };

        indicators.push(TechnicalIndicator {
            value: util::parse_price(&text_of(value), "indicator")?,
            signal: signal_text(&text_of(signal)),
            name,
        });
    }

    Ok(indicators)
}

// 均线单元格形如 "4.5630<span>Buy</span>"：span 为信号，其余文本为数值
fn average_cell(cell: &ElementRef) -> Result<(f64, String)> {
    let span_selector = selector("span")?;
    let signal = cell
        .select(&span_selector)
        .next()
        .map(|span| text_of(&span).to_lowercase())
        .unwrap_or_default();
    let text = text_of(cell).to_lowercase();
    let value = text.replace(signal.as_str(), "");
    Ok((util::parse_price(&value, "moving_average")?, signal))
}

/// MA5 到 MA200 的简单和指数移动平均
pub fn parse_moving_averages(html: &str) -> Result<Vec<MovingAverage>> {
    let document = Html::parse_document(html);
    let mut averages = Vec::new();

    for cells in table_rows(&document, MOVING_AVERAGES_TABLE)? {
        let position = match cells.iter().position(|cell| has_class(cell, "symbol")) {
            Some(position) => position,
            None => continue,
        };
        let label = text_of(&cells[position]);
        let period = label
            .replace("MA", "")
            .trim()
            .parse::<u32>()
            .map_err(|e| ScraperError::parse("period", format!("'{}': {}", label, e)))?;

        let (sma, ema) = match (cells.get(position + 1), cells.get(position + 2)) {
            (Some(sma), Some(ema)) => (average_cell(sma)?, average_cell(ema)?),
            _ => return Err(ScraperError::parse("moving_average", format!("{} row is incomplete", label))),
        };

        averages.push(MovingAverage {
            period,
            sma_value: sma.0,
            sma_signal: sma.1,
            ema_value: ema.0,
            ema_signal: ema.1,
        });
    }

    Ok(averages)
}

/// 枢轴点表，列名取自表头并转为小写下划线形式
pub fn parse_pivot_points(html: &str) -> Result<Vec<PivotPoint>> {
    let document = Html::parse_document(html);
    let header_selector = selector(&format!("{} thead tr th", PIVOT_POINTS_TABLE))?;

    let headers: Vec<String> = document
        .select(&header_selector)
        .map(|th| signal_text(&text_of(&th)))
        .collect();
    if headers.is_empty() {
        return Err(ScraperError::parse("table", "pivot points header not found in technical data"));
    }

    let mut points = Vec::new();
    for cells in table_rows(&document, PIVOT_POINTS_TABLE)? {
        let mut name = String::new();
        let mut levels = BTreeMap::new();
        for (header, cell) in headers.iter().zip(cells.iter()) {
            let text = text_of(cell);
            if header == "name" {
                name = text;
            } else {
                levels.insert(header.clone(), util::strip_thousands(&text).parse::<f64>().ok());
            }
        }
        points.push(PivotPoint { name, levels });
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    const TECHNICAL_HTML: &str = r#"
        <div>
        <table class="genTbl closedTbl technicalIndicatorsTbl smallTbl float_lang_base_1">
          <thead><tr><th>Name</th><th>Value</th><th>Action</th></tr></thead>
          <tbody>
            <tr><td class="first left symbol">RSI(14)</td><td class="right">47.432</td><td class="left textNum bold"><span class="neutral">Neutral</span></td></tr>
            <tr><td class="first left symbol">STOCH(9,6)</td><td class="right">89.157</td><td class="left textNum bold"><span>Overbought</span></td></tr>
            <tr><td class="first left symbol">ROC</td><td class="right">-1,004.25</td><td><span>Less Volatility</span></td></tr>
            <tr class="summaryTr"><td colspan="3">Buy: 3</td></tr>
          </tbody>
        </table>
        <table class="genTbl closedTbl movingAvgsTbl float_lang_base_2">
          <tbody>
            <tr><td class="first left symbol">MA5</td><td class="right">4.5600<br/><span class="greenFont">Buy</span></td><td class="right">4.5521<br/><span class="redFont">Sell</span></td></tr>
            <tr><td class="first left symbol">MA200</td><td class="right">4.9813<br/><span>Sell</span></td><td class="right">4.8870<br/><span>Sell</span></td></tr>
          </tbody>
        </table>
        <table class="genTbl closedTbl crossRatesTbl">
          <thead><tr><th>Name</th><th>S3</th><th>S2</th><th>S1</th><th>Pivot Points</th><th>R1</th><th>R2</th><th>R3</th></tr></thead>
          <tbody>
            <tr><td class="first left bold">Classic</td><td>4.493</td><td>4.521</td><td>4.542</td><td>4.570</td><td>4.591</td><td>4.619</td><td>4.640</td></tr>
            <tr><td class="first left bold">DeMark's</td><td>-</td><td>-</td><td>-</td><td>4.556</td><td>4.563</td><td>-</td><td>-</td></tr>
          </tbody>
        </table>
        </div>"#;

    #[test]
    fn test_indicators() {
        let indicators = parse_technical_indicators(TECHNICAL_HTML).unwrap();
        assert_eq!(indicators.len(), 3);
        assert_eq!(indicators[0].name, "RSI(14)");
        assert_eq!(indicators[0].value, 47.432);
        assert_eq!(indicators[0].signal, "neutral");
        assert_eq!(indicators[2].value, -1004.25);
        assert_eq!(indicators[2].signal, "less_volatility");
    }

    #[test]
    fn test_moving_averages() {
        let averages = parse_moving_averages(TECHNICAL_HTML).unwrap();
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].period, 5);
        assert_eq!(averages[0].sma_value, 4.56);
        assert_eq!(averages[0].sma_signal, "buy");
        assert_eq!(averages[0].ema_value, 4.5521);
        assert_eq!(averages[0].ema_signal, "sell");
        assert_eq!(averages[1].period, 200);
    }

    #[test]
    fn test_pivot_points_follow_header() {
        let points = parse_pivot_points(TECHNICAL_HTML).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].name, "Classic");
        assert_eq!(points[0].levels["pivot_points"], Some(4.57));
        assert_eq!(points[0].levels["s3"], Some(4.493));
        assert_eq!(points[1].levels["s1"], None);
        assert_eq!(points[1].levels["r1"], Some(4.563));
    }

    #[test]
    fn test_missing_tables_are_parse_errors() {
        let err = parse_moving_averages("<div>rate limited</div>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        let err = parse_pivot_points("<div></div>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
