use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, ScraperError};

/// 金融产品类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentFamily {
    Stock,
    Fund,
    Etf,
    Index,
    CurrencyCross,
    Bond,
    Commodity,
    Crypto,
    Certificate,
}

/// 查找产品时使用的列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey {
    Symbol,
    Name,
}

/// 国家参数在该类别中的要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryRule {
    Required,
    Optional,
    Unused,
}

/// 请求表单 header 字段取自哪一列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSource {
    Symbol,
    FullName,
    Name,
}

/// 每个类别的差异用数据描述，取代按类别复制的抓取函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilySchema {
    pub has_volume: bool,
    pub has_currency: bool,
    pub has_exchange: bool,
    pub lookup_key: LookupKey,
    pub country: CountryRule,
    pub header: HeaderSource,
    pub header_suffix: &'static str,
}

impl InstrumentFamily {
    pub const ALL: [InstrumentFamily; 9] = [
        InstrumentFamily::Stock,
        InstrumentFamily::Fund,
        InstrumentFamily::Etf,
        InstrumentFamily::Index,
        InstrumentFamily::CurrencyCross,
        InstrumentFamily::Bond,
        InstrumentFamily::Commodity,
        InstrumentFamily::Crypto,
        InstrumentFamily::Certificate,
    ];

    pub fn schema(&self) -> FamilySchema {
        use CountryRule::*;
        use HeaderSource::*;

        let (has_volume, has_currency, has_exchange, lookup_key, country, header) = match self {
            InstrumentFamily::Stock => (true, true, false, LookupKey::Symbol, Required, Symbol),
            InstrumentFamily::Fund => (false, true, false, LookupKey::Name, Required, Symbol),
            InstrumentFamily::Etf => (true, true, true, LookupKey::Name, Required, Symbol),
            InstrumentFamily::Index => (true, true, false, LookupKey::Name, Required, FullName),
            InstrumentFamily::CurrencyCross => (false, true, false, LookupKey::Name, Unused, Name),
            InstrumentFamily::Bond => (false, false, false, LookupKey::Name, Optional, FullName),
            InstrumentFamily::Commodity => (false, true, false, LookupKey::Name, Optional, FullName),
            InstrumentFamily::Crypto => (true, true, false, LookupKey::Name, Unused, Name),
            InstrumentFamily::Certificate => (false, false, false, LookupKey::Name, Required, Symbol),
        };

        let header_suffix = match self {
            InstrumentFamily::Bond => " Bond Yield Historical Data",
            _ => " Historical Data",
        };

        FamilySchema {
            has_volume,
            has_currency,
            has_exchange,
            lookup_key,
            country,
            header,
            header_suffix,
        }
    }

    /// 参考数据文件名
    pub fn file_name(&self) -> &'static str {
        match self {
            InstrumentFamily::Stock => "stocks.csv",
            InstrumentFamily::Fund => "funds.csv",
            InstrumentFamily::Etf => "etfs.csv",
            InstrumentFamily::Index => "indices.csv",
            InstrumentFamily::CurrencyCross => "currency_crosses.csv",
            InstrumentFamily::Bond => "bonds.csv",
            InstrumentFamily::Commodity => "commodities.csv",
            InstrumentFamily::Crypto => "cryptos.csv",
            InstrumentFamily::Certificate => "certificates.csv",
        }
    }

    /// 产品页面所在的站点栏目，例如 /equities/<tag>
    pub fn page_section(&self) -> &'static str {
        match self {
            InstrumentFamily::Stock => "equities",
            InstrumentFamily::Fund => "funds",
            InstrumentFamily::Etf => "etfs",
            InstrumentFamily::Index => "indices",
            InstrumentFamily::CurrencyCross => "currencies",
            InstrumentFamily::Bond => "rates-bonds",
            InstrumentFamily::Commodity => "commodities",
            InstrumentFamily::Crypto => "crypto",
            InstrumentFamily::Certificate => "certificates",
        }
    }

    /// 按国家列出行情的概览页，以及页面中的结果表选择器。
    /// 加密货币、货币对和商品没有按国家的概览页
    pub fn overview_page(&self, country: &str) -> Option<(String, &'static str)> {
        let slug = match country.trim().to_lowercase().as_str() {
            "united states" => "usa".to_string(),
            "united kingdom" => "uk".to_string(),
            other => other.replace(' ', "-"),
        };

        match self {
            InstrumentFamily::Index => Some((
                format!(
                    "/indices/{}-indices?&majorIndices=on&primarySectors=on&additionalIndices=on&otherIndices=on",
                    slug
                ),
                "table#cr1",
            )),
            InstrumentFamily::Bond => Some((format!("/rates-bonds/{}-government-bonds", slug), "table#cr1")),
            InstrumentFamily::Etf => Some((format!("/etfs/{}-etfs?&issuer_filter=0", slug), "table#etfs")),
            InstrumentFamily::Fund => Some((format!("/funds/{}-funds?&issuer_filter=0", slug), "table#etfs")),
            InstrumentFamily::Certificate => Some((
                format!("/certificates/{}-certificates", country.trim().to_lowercase().replace(' ', "-")),
                "table#certificates",
            )),
            InstrumentFamily::Stock
            | InstrumentFamily::CurrencyCross
            | InstrumentFamily::Commodity
            | InstrumentFamily::Crypto => None,
        }
    }

    /// 信息页中放产品名称的键
    pub fn information_name_key(&self) -> &'static str {
        match self {
            InstrumentFamily::Stock => "Stock Symbol",
            InstrumentFamily::Fund => "Fund Name",
            InstrumentFamily::Etf => "ETF Name",
            InstrumentFamily::Index => "Index Name",
            InstrumentFamily::CurrencyCross => "Currency Cross",
            InstrumentFamily::Bond => "Bond Name",
            InstrumentFamily::Commodity => "Commodity Name",
            InstrumentFamily::Crypto => "Crypto Currency",
            InstrumentFamily::Certificate => "Certificate Name",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentFamily::Stock => "stock",
            InstrumentFamily::Fund => "fund",
            InstrumentFamily::Etf => "etf",
            InstrumentFamily::Index => "index",
            InstrumentFamily::CurrencyCross => "currency_cross",
            InstrumentFamily::Bond => "bond",
            InstrumentFamily::Commodity => "commodity",
            InstrumentFamily::Crypto => "crypto",
            InstrumentFamily::Certificate => "certificate",
        }
    }
}

impl FromStr for InstrumentFamily {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "stock" | "stocks" => Ok(InstrumentFamily::Stock),
            "fund" | "funds" => Ok(InstrumentFamily::Fund),
            "etf" | "etfs" => Ok(InstrumentFamily::Etf),
            "index" | "indices" => Ok(InstrumentFamily::Index),
            "currency_cross" | "currency_crosses" => Ok(InstrumentFamily::CurrencyCross),
            "bond" | "bonds" => Ok(InstrumentFamily::Bond),
            "commodity" | "commodities" => Ok(InstrumentFamily::Commodity),
            "crypto" | "cryptos" => Ok(InstrumentFamily::Crypto),
            "certificate" | "certificates" => Ok(InstrumentFamily::Certificate),
            other => Err(ScraperError::Validation(format!(
                "unknown instrument family '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for InstrumentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 参考数据 CSV 中的一行。各类别文件列不同，缺失列为 None
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InstrumentRecord {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub isin: Option<String>,
    #[serde(default)]
    pub stock_exchange: Option<String>,
    #[serde(default)]
    pub def_stock_exchange: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub second: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    /// 仅加密货币文件有此列，unavailable 表示上游不提供数据
    #[serde(default)]
    pub status: Option<String>,
}

impl InstrumentRecord {
    /// 按列名取值，供 search 使用
    pub fn column(&self, column: &str) -> Option<&str> {
        let value = match column {
            "name" => Some(&self.name),
            "full_name" => self.full_name.as_ref(),
            "symbol" => self.symbol.as_ref(),
            "country" => self.country.as_ref(),
            "currency" => self.currency.as_ref(),
            "isin" => self.isin.as_ref(),
            "stock_exchange" => self.stock_exchange.as_ref(),
            "base" => self.base.as_ref(),
            "second" => self.second.as_ref(),
            "group" => self.group.as_ref(),
            "tag" => self.tag.as_ref(),
            "status" => self.status.as_ref(),
            _ => None,
        };
        value.map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn is_default_exchange(&self) -> bool {
        matches!(
            self.def_stock_exchange.as_deref().map(str::to_lowercase).as_deref(),
            Some("true") | Some("1")
        )
    }

    /// 该类别下用于匹配查询的值
    pub fn lookup_value(&self, key: LookupKey) -> &str {
        match key {
            LookupKey::Symbol => self.symbol.as_deref().unwrap_or(&self.name),
            LookupKey::Name => &self.name,
        }
    }

    /// 历史数据请求表单中的 header 字段
    pub fn request_header(&self, schema: &FamilySchema) -> String {
        let base = match schema.header {
            HeaderSource::Symbol => self.symbol.as_deref().unwrap_or(&self.name),
            HeaderSource::FullName => self.full_name.as_deref().unwrap_or(&self.name),
            HeaderSource::Name => &self.name,
        };
        format!("{}{}", base, schema.header_suffix)
    }

    /// 加密货币标记为 unavailable 时上游不提供数据，在发请求前拒绝
    pub fn ensure_retrievable(&self, family: InstrumentFamily) -> Result<()> {
        let unavailable = self
            .status
            .as_deref()
            .map(|status| status.trim().eq_ignore_ascii_case("unavailable"))
            .unwrap_or(false);
        if unavailable {
            return Err(ScraperError::Validation(format!(
                "{} {} is not available for retrieval",
                family, self.name
            )));
        }
        Ok(())
    }

    /// 产品页面的 URL 片段
    pub fn page_tag(&self) -> Result<&str> {
        self.tag
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .ok_or_else(|| ScraperError::parse("tag", format!("{} has no page tag in the reference data", self.name)))
    }

    /// 行情所使用的币种；货币对取报价货币
    pub fn quote_currency(&self, family: InstrumentFamily) -> Option<String> {
        let value = match family {
            InstrumentFamily::CurrencyCross => self.second.as_ref().or(self.currency.as_ref()),
            _ => self.currency.as_ref(),
        };
        value.filter(|v| !v.is_empty()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bond() -> InstrumentRecord {
        InstrumentRecord {
            id: 23705,
            name: "Spain 10Y".to_string(),
            full_name: Some("Spain 10-Year".to_string()),
            country: Some("spain".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_family_parse_accepts_plural_names() {
        assert_eq!("indices".parse::<InstrumentFamily>().unwrap(), InstrumentFamily::Index);
        assert_eq!(
            "currency-crosses".parse::<InstrumentFamily>().unwrap(),
            InstrumentFamily::CurrencyCross
        );
        assert!("options".parse::<InstrumentFamily>().is_err());
    }

    #[test]
    fn test_schema_optional_columns() {
        let bond = InstrumentFamily::Bond.schema();
        assert!(!bond.has_volume && !bond.has_currency && !bond.has_exchange);

        let commodity = InstrumentFamily::Commodity.schema();
        assert!(!commodity.has_volume && commodity.has_currency);

        let etf = InstrumentFamily::Etf.schema();
        assert!(etf.has_volume && etf.has_currency && etf.has_exchange);
    }

    #[test]
    fn test_bond_header_uses_full_name() {
        let schema = InstrumentFamily::Bond.schema();
        assert_eq!(bond().request_header(&schema), "Spain 10-Year Bond Yield Historical Data");
    }

    #[test]
    fn test_unavailable_crypto_is_rejected() {
        let crypto = InstrumentRecord {
            id: 1057391,
            name: "Tether".to_string(),
            status: Some("unavailable".to_string()),
            ..Default::default()
        };
        let err = crypto.ensure_retrievable(InstrumentFamily::Crypto).unwrap_err();
        assert!(matches!(err, ScraperError::Validation(_)));

        let available = InstrumentRecord {
            status: Some("available".to_string()),
            ..crypto
        };
        assert!(available.ensure_retrievable(InstrumentFamily::Crypto).is_ok());
        assert!(bond().ensure_retrievable(InstrumentFamily::Bond).is_ok());
    }

    #[test]
    fn test_overview_pages_use_site_slugs() {
        let (path, table) = InstrumentFamily::Bond.overview_page("United States").unwrap();
        assert_eq!(path, "/rates-bonds/usa-government-bonds");
        assert_eq!(table, "table#cr1");

        let (path, _) = InstrumentFamily::Etf.overview_page("south korea").unwrap();
        assert_eq!(path, "/etfs/south-korea-etfs?&issuer_filter=0");

        let (path, _) = InstrumentFamily::Certificate.overview_page("united kingdom").unwrap();
        assert_eq!(path, "/certificates/united-kingdom-certificates");

        assert!(InstrumentFamily::Crypto.overview_page("").is_none());
    }

    #[test]
    fn test_currency_cross_quotes_in_second_currency() {
        let cross = InstrumentRecord {
            id: 1,
            name: "EUR/USD".to_string(),
            base: Some("EUR".to_string()),
            second: Some("USD".to_string()),
            ..Default::default()
        };
        assert_eq!(cross.quote_currency(InstrumentFamily::CurrencyCross), Some("USD".to_string()));
        assert_eq!(bond().quote_currency(InstrumentFamily::Bond), None);
    }
}
