use arrow::datatypes::Date32Type;
use arrow::temporal_conversions::date32_to_datetime;
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde::Serializer;

use crate::errors::{Result, ScraperError};

/// 调用方接口统一使用的日期格式
pub const DMY_FORMAT: &str = "%d/%m/%Y";
/// 历史数据接口 st_date / end_date 使用的格式
pub const MDY_FORMAT: &str = "%m/%d/%Y";
/// 上游用来表示"无数据"的哨兵行文本
pub const NO_RESULTS_SENTINEL: &str = "No results found";

// 日期转换工具
pub fn parse_dmy(date_str: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), DMY_FORMAT).map_err(|_| {
        ScraperError::Validation(format!(
            "incorrect {} format '{}', it should be 'dd/mm/yyyy'",
            field, date_str
        ))
    })
}

pub fn format_dmy(date: &NaiveDate) -> String {
    date.format(DMY_FORMAT).to_string()
}

pub fn format_mdy(date: &NaiveDate) -> String {
    date.format(MDY_FORMAT).to_string()
}

pub fn serialize_dmy<S: Serializer>(date: &NaiveDate, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_dmy(date))
}

pub fn serialize_opt_dmy<S: Serializer>(
    date: &Option<NaiveDate>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match date {
        Some(date) => serializer.serialize_str(&format_dmy(date)),
        None => serializer.serialize_none(),
    }
}

/// Unix 时间戳转换为交易所时区下的日历日期，丢弃时分秒
pub fn epoch_to_date(epoch: &str, tz: &Tz) -> Result<NaiveDate> {
    let secs = epoch
        .trim()
        .parse::<i64>()
        .map_err(|e| ScraperError::parse("date", format!("'{}': {}", epoch, e)))?;

    tz.timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.date_naive())
        .ok_or_else(|| ScraperError::parse("date", format!("timestamp {} out of range", secs)))
}

pub fn date_to_epoch_days(date: &NaiveDate) -> i32 {
    Date32Type::from_naive_date(*date)
}

pub fn epoch_days_to_date(days: i32) -> Option<NaiveDate> {
    date32_to_datetime(days).map(|dt| dt.date())
}

// 数值转换工具
pub fn strip_thousands(text: &str) -> String {
    text.trim().replace(',', "")
}

pub fn parse_price(cell: &str, field: &str) -> Result<f64> {
    let cleaned = strip_thousands(cell);
    if cleaned.is_empty() {
        return Err(ScraperError::parse(field, "empty cell"));
    }
    cleaned
        .parse::<f64>()
        .map_err(|e| ScraperError::parse(field, format!("'{}': {}", cell, e)))
}

/// 展开 K/M/B/T 缩写，例如 3.5M -> "3500000"。
///
/// 按十进制移动小数点，不经过浮点运算；结果去掉多余的前导零和小数尾零。
pub fn expand_abbreviation(text: &str, field: &str) -> Result<String> {
    let cleaned = strip_thousands(text);
    let (number, shift) = match cleaned.chars().last() {
        Some('K') | Some('k') => (&cleaned[..cleaned.len() - 1], 3),
        Some('M') | Some('m') => (&cleaned[..cleaned.len() - 1], 6),
        Some('B') | Some('b') => (&cleaned[..cleaned.len() - 1], 9),
        Some('T') | Some('t') => (&cleaned[..cleaned.len() - 1], 12),
        Some(_) => (cleaned.as_str(), 0),
        None => return Err(ScraperError::parse(field, "empty cell")),
    };

    let number = number.trim();
    let (negative, unsigned) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(ScraperError::parse(field, format!("'{}' format is not supported", text)));
    }

    let mut digits = format!("{}{}", whole, fraction);
    let point = whole.len() + shift;
    if digits.len() < point {
        digits.push_str(&"0".repeat(point - digits.len()));
    }
    let (int_digits, frac_digits) = digits.split_at(point);
    let int_digits = int_digits.trim_start_matches('0');
    let frac_digits = frac_digits.trim_end_matches('0');

    let mut expanded = String::with_capacity(digits.len() + 2);
    if negative && !(int_digits.is_empty() && frac_digits.is_empty()) {
        expanded.push('-');
    }
    expanded.push_str(if int_digits.is_empty() { "0" } else { int_digits });
    if !frac_digits.is_empty() {
        expanded.push('.');
        expanded.push_str(frac_digits);
    }
    Ok(expanded)
}

/// 成交量单元格，空单元格表示上游没有提供。小数部分直接截断
pub fn parse_volume(cell: Option<&str>) -> Result<Option<u64>> {
    let cell = match cell.map(str::trim) {
        None | Some("") | Some("-") => return Ok(None),
        Some(cell) => cell,
    };

    let expanded = expand_abbreviation(cell, "volume")?;
    let whole = expanded.split_once('.').map_or(expanded.as_str(), |(whole, _)| whole);
    whole
        .parse::<u64>()
        .map(Some)
        .map_err(|e| ScraperError::parse("volume", format!("'{}' is not a valid volume: {}", cell, e)))
}

// Arrow数据转换工具
pub mod arrow_utils {
    use super::*;
    use crate::models::price::PricePoint;
    use arrow::array::ArrayRef;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::reader::FileReader;
    use arrow::ipc::writer::FileWriter;
    use arrow::record_batch::RecordBatch;
    use arrow_array::{Array, Date32Array, Float64Array, StringArray, UInt64Array};
    use log::info;
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;

    pub fn price_schema() -> Schema {
        Schema::new(vec![
            Field::new("Date", DataType::Date32, false),
            Field::new("Open", DataType::Float64, false),
            Field::new("High", DataType::Float64, false),
            Field::new("Low", DataType::Float64, false),
            Field::new("Close", DataType::Float64, false),
            Field::new("Volume", DataType::UInt64, true),
            Field::new("Currency", DataType::Utf8, true),
            Field::new("Exchange", DataType::Utf8, true),
        ])
    }

    // 将行情转换为以日期为索引的记录批次，缺失字段写为 null
    pub fn price_points_to_record_batch(points: &[PricePoint]) -> Result<RecordBatch> {
        let dates = Date32Array::from(points.iter().map(|p| date_to_epoch_days(&p.date)).collect::<Vec<_>>());
        let opens = Float64Array::from(points.iter().map(|p| p.open).collect::<Vec<_>>());
        let highs = Float64Array::from(points.iter().map(|p| p.high).collect::<Vec<_>>());
        let lows = Float64Array::from(points.iter().map(|p| p.low).collect::<Vec<_>>());
        let closes = Float64Array::from(points.iter().map(|p| p.close).collect::<Vec<_>>());
        let volumes: UInt64Array = points.iter().map(|p| p.volume).collect();
        let currencies: StringArray = points.iter().map(|p| p.currency.as_deref()).collect();
        let exchanges: StringArray = points.iter().map(|p| p.exchange.as_deref()).collect();

        let columns: Vec<ArrayRef> = vec![
            Arc::new(dates),
            Arc::new(opens),
            Arc::new(highs),
            Arc::new(lows),
            Arc::new(closes),
            Arc::new(volumes),
            Arc::new(currencies),
            Arc::new(exchanges),
        ];

        Ok(RecordBatch::try_new(Arc::new(price_schema()), columns)?)
    }

    pub fn record_batch_to_price_points(batch: &RecordBatch) -> Result<Vec<PricePoint>> {
        fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
            batch
                .column_by_name(name)
                .and_then(|a| a.as_any().downcast_ref::<T>())
                .ok_or_else(|| ScraperError::parse(name, "missing or mistyped column in price table"))
        }

        let dates = column::<Date32Array>(batch, "Date")?;
        let opens = column::<Float64Array>(batch, "Open")?;
        let highs = column::<Float64Array>(batch, "High")?;
        let lows = column::<Float64Array>(batch, "Low")?;
        let closes = column::<Float64Array>(batch, "Close")?;
        let volumes = column::<UInt64Array>(batch, "Volume")?;
        let currencies = column::<StringArray>(batch, "Currency")?;
        let exchanges = column::<StringArray>(batch, "Exchange")?;

        let mut points = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let date = epoch_days_to_date(dates.value(i))
                .ok_or_else(|| ScraperError::parse("Date", format!("day {} out of range", dates.value(i))))?;
            points.push(PricePoint {
                date,
                open: opens.value(i),
                high: highs.value(i),
                low: lows.value(i),
                close: closes.value(i),
                volume: (!volumes.is_null(i)).then(|| volumes.value(i)),
                currency: (!currencies.is_null(i)).then(|| currencies.value(i).to_string()),
                exchange: (!exchanges.is_null(i)).then(|| exchanges.value(i).to_string()),
            });
        }
        Ok(points)
    }

    // 将行情表保存到Arrow文件
    pub fn save_table_to_arrow(batch: &RecordBatch, path: &Path) -> Result<()> {
        info!("Saving {} price rows to {}", batch.num_rows(), path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, &batch.schema())?;
        writer.write(batch)?;
        writer.finish()?;

        Ok(())
    }

    // 从Arrow文件读取行情
    pub fn read_price_points_from_arrow(path: &Path) -> Result<Vec<PricePoint>> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None)?;

        let mut result = Vec::new();
        for batch in reader {
            result.extend(record_batch_to_price_points(&batch?)?);
        }
        Ok(result)
    }
}
