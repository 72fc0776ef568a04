use crate::errors::{Result, ScraperError};
use crate::models::instrument::{InstrumentFamily, InstrumentRecord};
use crate::models::price::PricePoint;
use crate::scrapers::historical::RawPriceRow;
use crate::util;
use chrono_tz::Tz;

const TIMESTAMP: usize = 0;
const CLOSE: usize = 1;
const OPEN: usize = 2;
const HIGH: usize = 3;
const LOW: usize = 4;
const VOLUME: usize = 5;

/// 一个品种的行解析规则：是否有成交量，币种和交易所取自参考数据
#[derive(Debug, Clone, PartialEq)]
pub struct RowSchema {
    pub has_volume: bool,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    pub tz: Tz,
}

impl RowSchema {
    pub fn for_record(family: InstrumentFamily, record: &InstrumentRecord, tz: Tz) -> Self {
        let schema = family.schema();
        Self {
            has_volume: schema.has_volume,
            currency: if schema.has_currency {
                record.quote_currency(family)
            } else {
                None
            },
            exchange: if schema.has_exchange {
                record.stock_exchange.clone().filter(|e| !e.is_empty())
            } else {
                None
            },
            tz,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Point(PricePoint),
    /// "No results found" 提示行
    Sentinel,
}

fn required_cell<'a>(row: &'a RawPriceRow, index: usize, field: &str) -> Result<&'a str> {
    row.cells
        .get(index)
        .and_then(|cell| cell.as_deref())
        .ok_or_else(|| ScraperError::parse(field, "missing data-real-value"))
}

/// 将一行原始单元格转换为 PricePoint
pub fn normalize(row: &RawPriceRow, schema: &RowSchema) -> Result<RowOutcome> {
    if row.first_text == util::NO_RESULTS_SENTINEL {
        return Ok(RowOutcome::Sentinel);
    }

    let date = util::epoch_to_date(required_cell(row, TIMESTAMP, "date")?, &schema.tz)?;
    let close = util::parse_price(required_cell(row, CLOSE, "close")?, "close")?;
    let open = util::parse_price(required_cell(row, OPEN, "open")?, "open")?;
    let high = util::parse_price(required_cell(row, HIGH, "high")?, "high")?;
    let low = util::parse_price(required_cell(row, LOW, "low")?, "low")?;

    let volume = if schema.has_volume {
        util::parse_volume(row.cells.get(VOLUME).and_then(|cell| cell.as_deref()))?
    } else {
        None
    };

    Ok(RowOutcome::Point(PricePoint {
        date,
        open,
        high,
        low,
        close,
        volume,
        currency: schema.currency.clone(),
        exchange: schema.exchange.clone(),
    }))
}
