use crate::errors::Result;
use crate::models::price::{PricePoint, Projection, SortOrder};
use crate::util::arrow_utils;
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};

/// 行情结果的两种输出形式
#[derive(Debug, Clone)]
pub enum PriceOutput {
    Table(RecordBatch),
    Records(Vec<PricePoint>),
}

impl PriceOutput {
    pub fn len(&self) -> usize {
        match self {
            PriceOutput::Table(batch) => batch.num_rows(),
            PriceOutput::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 统一取出记录列表，Table 形式从列数据还原
    pub fn to_records(&self) -> Result<Vec<PricePoint>> {
        match self {
            PriceOutput::Table(batch) => arrow_utils::record_batch_to_price_points(batch),
            PriceOutput::Records(records) => Ok(records.clone()),
        }
    }
}

/// JSON 文档中行情数组所在的键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Historical,
    Recent,
}

impl SeriesKind {
    pub fn json_key(&self) -> &'static str {
        match self {
            SeriesKind::Historical => "historical",
            SeriesKind::Recent => "recent",
        }
    }
}

/// 调整排序并投影为指定形式。输入为降序（上游原生顺序）
pub fn assemble(mut rows: Vec<PricePoint>, order: SortOrder, projection: Projection) -> Result<PriceOutput> {
    if order == SortOrder::Ascending {
        rows.reverse();
    }

    match projection {
        Projection::Table => Ok(PriceOutput::Table(arrow_utils::price_points_to_record_batch(&rows)?)),
        Projection::RecordList => Ok(PriceOutput::Records(rows)),
    }
}

/// {"name": ..., "historical"|"recent": [...]}
pub fn json_document(name: &str, kind: SeriesKind, records: &[PricePoint]) -> Result<Value> {
    let mut document = Map::new();
    document.insert("name".to_string(), Value::String(name.to_string()));
    document.insert(kind.json_key().to_string(), serde_json::to_value(records)?);
    Ok(Value::Object(document))
}
