// 公开导出的模块，供外部使用
pub mod models;
pub mod data_provider;
pub mod errors;
pub mod services;

// 为了支持主程序，暂时保持这些模块公开
// 但在库使用场景中，这些应该是内部模块
#[doc(hidden)]
pub mod scrapers;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod util;

// 重新导出常用类型，方便使用
pub use config::Config;
pub use data_provider::ReferenceDataProvider;
pub use errors::{ErrorKind, Result, ScraperError};
pub use models::calendar::{CalendarKind, CalendarRow};
pub use models::instrument::{InstrumentFamily, InstrumentRecord};
pub use models::market::{
    CompanyProfile, Dividend, DividendKind, MovingAverage, OverviewRow, PivotPoint, QuoteResult, TechnicalIndicator,
    TechnicalInterval,
};
pub use models::price::{Interval, PricePoint, Projection, SortOrder};
pub use services::assembler::PriceOutput;
pub use services::data_service::{CalendarRequest, DataService, HistoricalRequest, PriceData, RecentRequest};
pub use services::market_data::{OverviewRequest, QuoteSearchRequest, TechnicalRequest};
