use crate::errors::{Result, ScraperError};
use crate::models::calendar::{CalendarPage, CalendarRow, PaginationCursor};
use crate::models::price::{DateRangeChunk, PricePoint};
use async_trait::async_trait;
use log::{debug, info, warn};

/// 单个子区间请求的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Rows(Vec<PricePoint>),
    /// 上游返回 "No results found"
    NoResults,
    /// 响应体为空
    EmptyBody,
}

/// 按子区间取历史数据
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn fetch_chunk(&self, chunk: &DateRangeChunk) -> Result<ChunkOutcome>;
}

/// 按游标取日历页；continuation 为上一页返回的 last_time_scope
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, cursor: &PaginationCursor, continuation: Option<&str>) -> Result<CalendarPage>;
}

/// 依次请求每个子区间并合并结果。
///
/// 返回按日期降序排列的数据（上游原生顺序），相邻子区间共享的边界日期只保留一行，
/// 保留的是较晚子区间中的那一行。任一子区间失败则整个调用失败。
pub async fn aggregate_chunks<S>(source: &S, chunks: &[DateRangeChunk]) -> Result<Vec<PricePoint>>
where
    S: ChunkSource + ?Sized,
{
    let mut per_chunk: Vec<Vec<PricePoint>> = Vec::with_capacity(chunks.len());

    for (index, chunk) in chunks.iter().enumerate() {
        let is_last = index + 1 == chunks.len();
        debug!("请求第 {}/{} 段: {} ~ {}", index + 1, chunks.len(), chunk.start, chunk.end);

        match source.fetch_chunk(chunk).await? {
            ChunkOutcome::Rows(rows) if !rows.is_empty() => {
                debug!("第 {} 段返回 {} 行", index + 1, rows.len());
                per_chunk.push(rows);
            }
            ChunkOutcome::NoResults if is_last && per_chunk.is_empty() => {
                return Err(ScraperError::NoData(format!(
                    "no results found between {} and {}",
                    chunks.first().map(|c| c.start).unwrap_or(chunk.start),
                    chunk.end
                )));
            }
            outcome => {
                debug!("第 {} 段无数据 ({})", index + 1, outcome_label(&outcome));
            }
        }
    }

    if per_chunk.is_empty() {
        return Err(ScraperError::NoData("every chunk returned an empty response".to_string()));
    }

    // 较晚的子区间先入列，稳定排序后去重时保留它的行
    let mut merged: Vec<PricePoint> = per_chunk.into_iter().rev().flatten().collect();
    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged.dedup_by_key(|point| point.date);

    info!("合并 {} 段数据，共 {} 行", chunks.len(), merged.len());
    Ok(merged)
}

fn outcome_label(outcome: &ChunkOutcome) -> &'static str {
    match outcome {
        ChunkOutcome::Rows(_) => "0 rows",
        ChunkOutcome::NoResults => "no results",
        ChunkOutcome::EmptyBody => "empty body",
    }
}

/// 游标分页，直到某页的末行标识与上一页相同、某页为空或上游声明没有更多数据。
///
/// 没有日期的行沿用最近一个显式日期，跨页有效。
pub async fn paginate<S>(source: &S) -> Result<Vec<CalendarRow>>
where
    S: PageSource + ?Sized,
{
    let mut cursor = PaginationCursor::default();
    let mut continuation: Option<String> = None;
    let mut results = Vec::new();

    loop {
        let page = source.fetch_page(&cursor, continuation.as_deref()).await?;

        let terminal_id = match page.terminal_id() {
            Some(id) => id.to_string(),
            None => {
                warn!("page {} returned no rows, stopping", cursor.page_offset);
                break;
            }
        };

        if cursor.last_seen_id.as_deref() == Some(terminal_id.as_str()) {
            debug!("page {} repeats terminal id {}, stopping", cursor.page_offset, terminal_id);
            break;
        }

        let row_count = page.rows.len();
        for raw in page.rows {
            if raw.date.is_some() {
                cursor.last_date = raw.date;
            }
            let date = cursor.last_date.ok_or_else(|| {
                ScraperError::parse("date", format!("row {} has no date and no preceding date", raw.id))
            })?;
            results.push(CalendarRow {
                id: raw.id,
                date,
                fields: raw.fields,
            });
        }

        info!("page {} added {} rows", cursor.page_offset, row_count);
        cursor.last_seen_id = Some(terminal_id);
        cursor.page_offset += 1;

        if page.has_more == Some(false) {
            debug!("upstream reports no more pages");
            break;
        }
        continuation = page.continuation;
    }

    Ok(results)
}
