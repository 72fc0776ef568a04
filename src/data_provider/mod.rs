use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use crate::errors::{Result, ScraperError};
use crate::models::instrument::{CountryRule, InstrumentFamily, InstrumentRecord};

const SEARCHABLE_COLUMNS: &[&str] = &[
    "name", "full_name", "symbol", "country", "currency", "isin", "stock_exchange", "base",
    "second", "group", "tag", "status",
];

/// 单个类别的参考数据及索引
#[derive(Debug, Default)]
struct FamilyTable {
    records: Vec<InstrumentRecord>,
    // 索引用于快速查找
    key_index: HashMap<String, Vec<usize>>,
    country_index: HashMap<String, Vec<usize>>,
}

impl FamilyTable {
    fn new(family: InstrumentFamily, records: Vec<InstrumentRecord>) -> Self {
        let mut table = Self {
            records,
            ..Default::default()
        };
        table.rebuild_indices(family);
        table
    }

    /// 重建索引
    fn rebuild_indices(&mut self, family: InstrumentFamily) {
        self.key_index.clear();
        self.country_index.clear();

        let key = family.schema().lookup_key;
        for (i, record) in self.records.iter().enumerate() {
            self.key_index
                .entry(normalize(record.lookup_value(key)))
                .or_insert_with(Vec::new)
                .push(i);

            if let Some(country) = record.country.as_deref().filter(|c| !c.is_empty()) {
                self.country_index
                    .entry(normalize(country))
                    .or_insert_with(Vec::new)
                    .push(i);
            }
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// 本地参考数据（产品名称 → id / 国家 / 币种），构造后只读
pub struct ReferenceDataProvider {
    tables: HashMap<InstrumentFamily, FamilyTable>,
}

impl ReferenceDataProvider {
    /// 从目录加载所有类别的 CSV，缺失的文件在查询时报错
    pub fn load_from_dir(dir: &str) -> Result<Self> {
        let mut tables = HashMap::new();

        for family in InstrumentFamily::ALL {
            let path = Path::new(dir).join(family.file_name());
            if !path.exists() {
                debug!("Reference file {} not found, skipping", path.display());
                continue;
            }
            let file = std::fs::File::open(&path)?;
            let records = Self::read_records(file)?;
            info!("Loaded {} {} records from {}", records.len(), family, path.display());
            tables.insert(family, FamilyTable::new(family, records));
        }

        if tables.is_empty() {
            warn!("No reference data found in {}", dir);
        }

        Ok(Self { tables })
    }

    /// 使用提供的数据创建实例
    pub fn new_with_data(data: Vec<(InstrumentFamily, Vec<InstrumentRecord>)>) -> Self {
        let tables = data
            .into_iter()
            .map(|(family, records)| (family, FamilyTable::new(family, records)))
            .collect();
        Self { tables }
    }

    /// 从任意 reader 读取一个类别的 CSV
    pub fn read_records<R: Read>(reader: R) -> Result<Vec<InstrumentRecord>> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut records = Vec::new();
        for row in csv_reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    fn table(&self, family: InstrumentFamily) -> Result<&FamilyTable> {
        self.tables.get(&family).ok_or_else(|| {
            ScraperError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} reference file not found or errored", family.file_name()),
            ))
        })
    }

    /// 获取该类别可用的国家
    pub fn list_countries(&self, family: InstrumentFamily) -> Result<BTreeSet<String>> {
        Ok(self.table(family)?.country_index.keys().cloned().collect())
    }

    /// 获取该类别的产品，可按国家过滤
    pub fn list(&self, family: InstrumentFamily, country: Option<&str>) -> Result<Vec<&InstrumentRecord>> {
        let table = self.table(family)?;
        match country {
            None => Ok(table.records.iter().collect()),
            Some(country) => {
                let indices = table.country_index.get(&normalize(country)).ok_or_else(|| {
                    ScraperError::NotFound(format!("country {} not found, check if it is correct", country))
                })?;
                Ok(indices.iter().map(|&i| &table.records[i]).collect())
            }
        }
    }

    /// 只返回用于查询的名称（股票为代码）
    pub fn list_names(&self, family: InstrumentFamily, country: Option<&str>) -> Result<Vec<String>> {
        let key = family.schema().lookup_key;
        Ok(self
            .list(family, country)?
            .into_iter()
            .map(|record| record.lookup_value(key).to_string())
            .collect())
    }

    /// 按列做大小写无关的子串搜索
    pub fn search(&self, family: InstrumentFamily, by: &str, value: &str) -> Result<Vec<&InstrumentRecord>> {
        let by = normalize(by);
        if !SEARCHABLE_COLUMNS.contains(&by.as_str()) {
            return Err(ScraperError::Validation(format!(
                "unknown search column '{}', available: {}",
                by,
                SEARCHABLE_COLUMNS.join(", ")
            )));
        }
        let needle = normalize(value);
        if needle.is_empty() {
            return Err(ScraperError::Validation("search value can not be empty".to_string()));
        }

        let found: Vec<&InstrumentRecord> = self
            .table(family)?
            .records
            .iter()
            .filter(|record| {
                record
                    .column(&by)
                    .map(|v| v.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .collect();

        if found.is_empty() {
            return Err(ScraperError::NotFound(format!(
                "no {} found with {} matching '{}'",
                family, by, value
            )));
        }
        Ok(found)
    }

    /// 解析出一个具体产品
    pub fn lookup(
        &self,
        family: InstrumentFamily,
        name: &str,
        country: Option<&str>,
        stock_exchange: Option<&str>,
    ) -> Result<&InstrumentRecord> {
        let schema = family.schema();
        let key = normalize(name);
        if key.is_empty() {
            return Err(ScraperError::Validation(format!(
                "{} parameter is mandatory and must be a valid name",
                family
            )));
        }

        let country = match (schema.country, country.map(normalize).filter(|c| !c.is_empty())) {
            (CountryRule::Required, None) => {
                return Err(ScraperError::Validation(format!(
                    "country can not be empty when retrieving a {}",
                    family
                )));
            }
            (CountryRule::Unused, Some(country)) => {
                debug!("Ignoring country {} for {}", country, family);
                None
            }
            (_, country) => country,
        };

        let table = self.table(family)?;
        if let Some(country) = &country {
            if !table.country_index.contains_key(country) {
                return Err(ScraperError::NotFound(format!(
                    "country {} not found, check if it is correct",
                    country
                )));
            }
        }

        let candidates: Vec<&InstrumentRecord> = table
            .key_index
            .get(&key)
            .map(|indices| indices.iter().map(|&i| &table.records[i]).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .filter(|record| match &country {
                Some(country) => record.country.as_deref().map(normalize).as_deref() == Some(country.as_str()),
                None => true,
            })
            .collect();

        if candidates.is_empty() {
            return Err(ScraperError::NotFound(format!(
                "{} {} not found, check if it is correct",
                family, name
            )));
        }

        if let Some(exchange) = stock_exchange.map(normalize).filter(|e| !e.is_empty()) {
            return candidates
                .into_iter()
                .find(|record| record.stock_exchange.as_deref().map(normalize).as_deref() == Some(exchange.as_str()))
                .ok_or_else(|| {
                    ScraperError::NotFound(format!(
                        "{} {} is not traded on stock exchange {}",
                        family, name, exchange
                    ))
                });
        }

        if schema.has_exchange {
            if let Some(default) = candidates.iter().copied().find(|record| record.is_default_exchange()) {
                return Ok(default);
            }
        }

        if country.is_none() {
            let countries: BTreeSet<_> = candidates.iter().filter_map(|r| r.country.as_deref()).collect();
            if countries.len() > 1 {
                return Err(ScraperError::Validation(format!(
                    "{} {} exists in several countries ({}), specify a country",
                    family,
                    name,
                    countries.into_iter().collect::<Vec<_>>().join(", ")
                )));
            }
        }

        Ok(candidates[0])
    }

    /// 商品的所有分组，例如 metals、softs
    pub fn commodity_groups(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .table(InstrumentFamily::Commodity)?
            .records
            .iter()
            .filter_map(|record| record.group.as_deref())
            .map(normalize)
            .filter(|group| !group.is_empty())
            .collect())
    }

    /// 商品列表，可按分组过滤；未知分组报 NotFound
    pub fn commodities(&self, group: Option<&str>) -> Result<Vec<&InstrumentRecord>> {
        let table = self.table(InstrumentFamily::Commodity)?;
        let group = match group.map(normalize).filter(|g| !g.is_empty()) {
            None => return Ok(table.records.iter().collect()),
            Some(group) => group,
        };

        let found: Vec<_> = table
            .records
            .iter()
            .filter(|record| record.group.as_deref().map(normalize).as_deref() == Some(group.as_str()))
            .collect();

        if found.is_empty() {
            return Err(ScraperError::NotFound(format!(
                "commodity group {} not found, available groups: {}",
                group,
                self.commodity_groups()?.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(found)
    }

    /// 货币对，可按基础货币和报价货币过滤
    pub fn currency_crosses(&self, base: Option<&str>, second: Option<&str>) -> Result<Vec<&InstrumentRecord>> {
        let base = base.map(str::to_uppercase);
        let second = second.map(str::to_uppercase);
        let accepts = |value: &Option<String>, wanted: &Option<String>| match wanted {
            Some(wanted) => value.as_deref().map(str::to_uppercase).as_deref() == Some(wanted.as_str()),
            None => true,
        };

        let found: Vec<_> = self
            .table(InstrumentFamily::CurrencyCross)?
            .records
            .iter()
            .filter(|record| accepts(&record.base, &base) && accepts(&record.second, &second))
            .collect();

        if found.is_empty() && (base.is_some() || second.is_some()) {
            return Err(ScraperError::NotFound(format!(
                "no currency crosses found for base {:?} and second {:?}",
                base, second
            )));
        }
        Ok(found)
    }

    /// 货币对中出现过的所有基础货币
    pub fn available_currencies(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .table(InstrumentFamily::CurrencyCross)?
            .records
            .iter()
            .filter_map(|record| record.base.clone())
            .filter(|base| !base.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STOCKS_CSV: &str = "\
country,name,full_name,isin,currency,symbol,tag,id
spain,BBVA,Banco Bilbao Vizcaya Argentaria SA,ES0113211835,EUR,BBVA,bbva,396
spain,Santander,Banco Santander SA,ES0113900J37,EUR,SAN,banco-santander,408
united states,Apple,Apple Inc,US0378331005,USD,AAPL,apple-computer-inc,6408
";

    const ETFS_CSV: &str = "\
country,name,full_name,symbol,isin,asset_class,currency,stock_exchange,def_stock_exchange,tag,id
germany,iShares Core DAX,iShares Core DAX UCITS,EXS1,DE0005933931,equity,EUR,Xetra,True,ishares-dax,14194
germany,iShares Core DAX,iShares Core DAX UCITS,EXS1,DE0005933931,equity,EUR,Frankfurt,False,ishares-dax?cid=1,46321
";

    const COMMODITIES_CSV: &str = "\
title,country,name,full_name,currency,group,tag,id
Gold,,Gold,Gold Futures,USD,metals,gold,8830
Coffee,united states,US Coffee C,US Coffee C Futures,USD,softs,us-coffee,8832
Coffee,united kingdom,US Coffee C,London Coffee Futures,GBP,softs,london-coffee,8911
";

    const CROSSES_CSV: &str = "\
name,full_name,base,base_name,second,second_name,tag,id
EUR/USD,Euro US Dollar,EUR,Euro,USD,US Dollar,eur-usd,1
USD/JPY,US Dollar Japanese Yen,USD,US Dollar,JPY,Japanese Yen,usd-jpy,3
EUR/JPY,Euro Japanese Yen,EUR,Euro,JPY,Japanese Yen,eur-jpy,9
";

    fn provider() -> ReferenceDataProvider {
        let read = |csv: &str| ReferenceDataProvider::read_records(csv.as_bytes()).unwrap();
        ReferenceDataProvider::new_with_data(vec![
            (InstrumentFamily::Stock, read(STOCKS_CSV)),
            (InstrumentFamily::Etf, read(ETFS_CSV)),
            (InstrumentFamily::Commodity, read(COMMODITIES_CSV)),
            (InstrumentFamily::CurrencyCross, read(CROSSES_CSV)),
        ])
    }

    #[test]
    fn test_stock_lookup_by_symbol_and_country() {
        let provider = provider();
        let record = provider.lookup(InstrumentFamily::Stock, " bbva ", Some("Spain"), None).unwrap();
        assert_eq!(record.id, 396);
        assert_eq!(record.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_stock_lookup_errors() {
        let provider = provider();
        let err = provider.lookup(InstrumentFamily::Stock, "bbva", None, None).unwrap_err();
        assert!(matches!(err, ScraperError::Validation(_)));

        let err = provider.lookup(InstrumentFamily::Stock, "bbva", Some("atlantis"), None).unwrap_err();
        assert!(matches!(err, ScraperError::NotFound(_)));

        let err = provider.lookup(InstrumentFamily::Stock, "aapl", Some("spain"), None).unwrap_err();
        assert!(matches!(err, ScraperError::NotFound(_)));
    }

    #[test]
    fn test_missing_family_file_is_io_error() {
        let err = provider().lookup(InstrumentFamily::Bond, "Spain 10Y", None, None).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Io);
    }

    #[test]
    fn test_etf_prefers_default_exchange() {
        let provider = provider();
        let record = provider
            .lookup(InstrumentFamily::Etf, "iShares Core DAX", Some("germany"), None)
            .unwrap();
        assert_eq!(record.stock_exchange.as_deref(), Some("Xetra"));

        let record = provider
            .lookup(InstrumentFamily::Etf, "iShares Core DAX", Some("germany"), Some("frankfurt"))
            .unwrap();
        assert_eq!(record.id, 46321);
    }

    #[test]
    fn test_commodity_ambiguous_without_country() {
        let provider = provider();
        let err = provider
            .lookup(InstrumentFamily::Commodity, "US Coffee C", None, None)
            .unwrap_err();
        assert!(matches!(err, ScraperError::Validation(_)));

        let record = provider
            .lookup(InstrumentFamily::Commodity, "us coffee c", Some("united kingdom"), None)
            .unwrap();
        assert_eq!(record.id, 8911);

        let gold = provider.lookup(InstrumentFamily::Commodity, "gold", None, None).unwrap();
        assert_eq!(gold.id, 8830);
    }

    #[test]
    fn test_countries_and_names() {
        let provider = provider();
        let countries = provider.list_countries(InstrumentFamily::Stock).unwrap();
        assert_eq!(countries.into_iter().collect::<Vec<_>>(), vec!["spain", "united states"]);
        assert_eq!(
            provider.list_names(InstrumentFamily::Stock, Some("spain")).unwrap(),
            vec!["BBVA", "SAN"]
        );
    }

    #[test]
    fn test_search() {
        let provider = provider();
        let found = provider.search(InstrumentFamily::Stock, "full_name", "banco").unwrap();
        assert_eq!(found.len(), 2);

        let err = provider.search(InstrumentFamily::Stock, "price", "1").unwrap_err();
        assert!(matches!(err, ScraperError::Validation(_)));

        let err = provider.search(InstrumentFamily::Stock, "name", "tesla").unwrap_err();
        assert!(matches!(err, ScraperError::NotFound(_)));
    }

    #[test]
    fn test_currency_crosses_filters() {
        let provider = provider();
        let eur = provider.currency_crosses(Some("eur"), None).unwrap();
        assert_eq!(eur.len(), 2);
        let jpy = provider.currency_crosses(Some("EUR"), Some("JPY")).unwrap();
        assert_eq!(jpy[0].name, "EUR/JPY");
        assert!(provider.currency_crosses(Some("CHF"), None).is_err());

        let currencies = provider.available_currencies().unwrap();
        assert_eq!(currencies.into_iter().collect::<Vec<_>>(), vec!["EUR", "USD"]);
    }

    #[test]
    fn test_commodity_groups_and_filter() {
        let provider = provider();
        let groups = provider.commodity_groups().unwrap();
        assert_eq!(groups.into_iter().collect::<Vec<_>>(), vec!["metals", "softs"]);

        let softs = provider.commodities(Some("Softs")).unwrap();
        assert_eq!(softs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![8832, 8911]);
        assert_eq!(provider.commodities(None).unwrap().len(), 3);

        let err = provider.commodities(Some("energy")).unwrap_err();
        assert!(matches!(err, ScraperError::NotFound(_)));
    }

    #[test]
    fn test_crypto_status_column_is_read() {
        let csv = "name,symbol,currency,status,id,tag\nBitcoin,BTC,USD,available,945629,bitcoin\nTether,USDT,USD,unavailable,1057391,tether\n";
        let records = ReferenceDataProvider::read_records(csv.as_bytes()).unwrap();
        assert_eq!(records[1].status.as_deref(), Some("unavailable"));

        let provider = ReferenceDataProvider::new_with_data(vec![(InstrumentFamily::Crypto, records)]);
        let found = provider.search(InstrumentFamily::Crypto, "status", "unavailable").unwrap();
        assert_eq!(found[0].name, "Tether");
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("stocks.csv")).unwrap();
        file.write_all(STOCKS_CSV.as_bytes()).unwrap();

        let provider = ReferenceDataProvider::load_from_dir(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(provider.list(InstrumentFamily::Stock, None).unwrap().len(), 3);
        assert!(provider.list(InstrumentFamily::Fund, None).is_err());
    }
}
