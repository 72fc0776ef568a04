use thiserror::Error;

/// 错误大类，调用方可据此区分"参数错误"、"确实无数据"与"网络失败"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Transport,
    NoData,
    Parse,
    Io,
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: HTTP status {status} from {endpoint}")]
    Transport { status: u16, endpoint: String },

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Parse error in field `{field}`: {message}")]
    Parse { field: String, message: String },

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),
}

impl ScraperError {
    pub fn parse(field: impl Into<String>, message: impl Into<String>) -> Self {
        ScraperError::Parse {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScraperError::Validation(_) | ScraperError::DateError(_) => ErrorKind::Validation,
            ScraperError::NotFound(_) => ErrorKind::NotFound,
            ScraperError::Transport { .. } | ScraperError::RequestError(_) => ErrorKind::Transport,
            ScraperError::NoData(_) => ErrorKind::NoData,
            ScraperError::Parse { .. } | ScraperError::JsonError(_) => ErrorKind::Parse,
            ScraperError::IoError(_) | ScraperError::CsvError(_) | ScraperError::ArrowError(_) => {
                ErrorKind::Io
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_separates_empty_result_from_bad_input() {
        let no_data = ScraperError::NoData("bbva".to_string());
        let invalid = ScraperError::Validation("from_date".to_string());
        let status = ScraperError::Transport {
            status: 503,
            endpoint: "/instruments/HistoricalDataAjax".to_string(),
        };

        assert_eq!(no_data.kind(), ErrorKind::NoData);
        assert_eq!(invalid.kind(), ErrorKind::Validation);
        assert_eq!(status.kind(), ErrorKind::Transport);
        assert_eq!(ScraperError::parse("close", "empty").kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_parse_error_names_field() {
        let err = ScraperError::parse("volume", "invalid digit");
        assert_eq!(err.to_string(), "Parse error in field `volume`: invalid digit");
    }
}
