use crate::errors::{Result, ScraperError};
use crate::models::price::{DateRange, DateRangeChunk};
use chrono::{Datelike, Months};

/// 将日期区间切分为不超过 max_span_years 年的连续子区间。
///
/// 相邻子区间共享边界日期，最后一个子区间截止于区间终点。
/// 年份差按日历年计算，2 月 29 日加年后落在非闰年时取 2 月 28 日。
pub fn partition(range: &DateRange, max_span_years: u32) -> Result<Vec<DateRangeChunk>> {
    if max_span_years == 0 {
        return Err(ScraperError::Validation(
            "max_span_years must be at least 1".to_string(),
        ));
    }

    let end = range.end();
    let mut cursor = range.start();
    let mut chunks = Vec::new();

    loop {
        let chunk_end = if i64::from(end.year() - cursor.year()) <= i64::from(max_span_years) {
            end
        } else {
            // 走到这里时 max_span_years 小于区间年数，乘 12 不会溢出
            cursor
                .checked_add_months(Months::new(12 * max_span_years))
                .ok_or_else(|| ScraperError::Validation(format!("date {} is out of range", cursor)))?
        };

        chunks.push(DateRangeChunk {
            start: cursor,
            end: chunk_end,
        });

        if chunk_end == end {
            break;
        }
        cursor = chunk_end;
    }

    Ok(chunks)
}
