use chrono_tz::Tz;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
];

pub struct Config {
    pub data_dir: String,
    pub base_url: String,
    pub max_span_years: u32,
    pub timeout: Duration,
    pub request_interval: Duration,
    pub user_agents: Vec<String>,
    pub exchange_tz: Tz,
    pub filters: FilterTables,
}

impl Config {
    pub fn new() -> Self {
        Self {
            data_dir: "resources".to_string(),
            base_url: "https://www.investing.com".to_string(),
            max_span_years: 20,
            timeout: Duration::from_secs(30),
            request_interval: Duration::from_millis(500),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            exchange_tz: chrono_tz::UTC,
            filters: FilterTables::default(),
        }
    }

    pub fn with_data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_span_years(mut self, years: u32) -> Self {
        self.max_span_years = years;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    pub fn with_user_agents(mut self, agents: Vec<String>) -> Self {
        if !agents.is_empty() {
            self.user_agents = agents;
        }
        self
    }

    pub fn with_exchange_tz(mut self, tz: Tz) -> Self {
        self.exchange_tz = tz;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// 财经日历筛选用的查找表，启动时构造一次，随 Config 传递
pub struct FilterTables {
    pub country_ids: HashMap<&'static str, u32>,
    pub time_zones: HashMap<&'static str, Vec<u32>>,
    pub time_filters: HashMap<&'static str, &'static str>,
    pub categories: HashMap<&'static str, &'static str>,
    pub importances: HashMap<u32, &'static str>,
}

impl FilterTables {
    pub fn country_id(&self, country: &str) -> Option<u32> {
        self.country_ids.get(country.trim().to_lowercase().as_str()).copied()
    }

    pub fn importance_key(&self, importance: &str) -> Option<u32> {
        let importance = importance.trim().to_lowercase();
        self.importances
            .iter()
            .find(|(_, label)| **label == importance)
            .map(|(key, _)| *key)
    }

    pub fn importance_label(&self, key: u32) -> Option<&'static str> {
        self.importances.get(&key).copied()
    }
}

impl Default for FilterTables {
    fn default() -> Self {
        let country_ids = [
            ("argentina", 29), ("australia", 25), ("austria", 54), ("bahrain", 145),
            ("bangladesh", 47), ("belgium", 34), ("bosnia", 174), ("botswana", 163),
            ("brazil", 32), ("bulgaria", 70), ("canada", 6), ("cayman islands", 232),
            ("chile", 27), ("china", 37), ("colombia", 122), ("costa rica", 15),
            ("croatia", 113), ("cyprus", 107), ("czech republic", 55), ("denmark", 24),
            ("dubai", 143), ("ecuador", 121), ("egypt", 59), ("estonia", 89),
            ("euro zone", 72), ("finland", 71), ("france", 22), ("germany", 17),
            ("greece", 51), ("hong kong", 39), ("hungary", 93), ("iceland", 106),
            ("india", 14), ("indonesia", 48), ("iraq", 66), ("ireland", 33),
            ("israel", 23), ("italy", 10), ("ivory coast", 78), ("jamaica", 119),
            ("japan", 35), ("jordan", 92), ("kazakhstan", 102), ("kenya", 57),
            ("kuwait", 94), ("latvia", 97), ("lebanon", 68), ("lithuania", 96),
            ("luxembourg", 103), ("malawi", 111), ("malaysia", 42), ("malta", 109),
            ("mauritius", 188), ("mexico", 7), ("mongolia", 139), ("montenegro", 247),
            ("morocco", 105), ("namibia", 172), ("netherlands", 21), ("new zealand", 43),
            ("nigeria", 20), ("norway", 60), ("oman", 87), ("pakistan", 44),
            ("palestine", 193), ("peru", 125), ("philippines", 45), ("poland", 53),
            ("portugal", 38), ("qatar", 170), ("romania", 100), ("russia", 56),
            ("rwanda", 80), ("saudi arabia", 52), ("serbia", 238), ("singapore", 36),
            ("slovakia", 90), ("slovenia", 112), ("south africa", 110), ("south korea", 11),
            ("spain", 26), ("sri lanka", 162), ("sweden", 9), ("switzerland", 12),
            ("taiwan", 46), ("tanzania", 85), ("thailand", 41), ("tunisia", 202),
            ("turkey", 63), ("uganda", 123), ("ukraine", 61), ("united kingdom", 4),
            ("united states", 5), ("venezuela", 138), ("vietnam", 178), ("zambia", 84),
            ("zimbabwe", 75),
        ]
        .into_iter()
        .collect();

        let time_zones = [
            ("GMT -11:00", vec![2, 35]),
            ("GMT -10:00", vec![3]),
            ("GMT -9:00", vec![4]),
            ("GMT -8:00", vec![36, 5]),
            ("GMT -7:00", vec![37, 38, 6]),
            ("GMT -6:00", vec![39, 7, 40, 41]),
            ("GMT -5:00", vec![42, 8, 43]),
            ("GMT -4:00", vec![10, 9, 45, 46]),
            ("GMT -3:30", vec![11]),
            ("GMT -3:00", vec![44, 12, 48, 49, 50, 51, 47]),
            ("GMT -1:00", vec![14, 53]),
            ("GMT", vec![55, 15, 56]),
            ("GMT +1:00", vec![16, 57, 58, 54, 166, 59, 60]),
            ("GMT +2:00", vec![62, 64, 65, 66, 68, 17, 67, 61]),
            ("GMT +3:00", vec![71, 63, 70, 18, 72]),
            ("GMT +3:30", vec![19]),
            ("GMT +4:00", vec![20, 73]),
            ("GMT +4:30", vec![21]),
            ("GMT +5:00", vec![22, 77]),
            ("GMT +5:30", vec![23, 79]),
            ("GMT +5:45", vec![24]),
            ("GMT +6:00", vec![25]),
            ("GMT +6:30", vec![26]),
            ("GMT +7:00", vec![27]),
            ("GMT +8:00", vec![178, 28, 113]),
            ("GMT +9:00", vec![29, 88]),
            ("GMT +9:30", vec![90]),
            ("GMT +10:30", vec![30]),
            ("GMT +11:00", vec![31, 32]),
            ("GMT +12:00", vec![1]),
            ("GMT +13:00", vec![33]),
        ]
        .into_iter()
        .collect();

        let time_filters = [("time_remaining", "timeRemain"), ("time_only", "timeOnly")]
            .into_iter()
            .collect();

        let categories = [
            ("credit", "_credit"),
            ("employment", "_employment"),
            ("economic_activity", "_economicActivity"),
            ("inflation", "_inflation"),
            ("central_banks", "_centralBanks"),
            ("confidence", "_confidenceIndex"),
            ("balance", "_balance"),
            ("bonds", "_Bonds"),
        ]
        .into_iter()
        .collect();

        let importances = [(1, "low"), (2, "medium"), (3, "high")].into_iter().collect();

        Self {
            country_ids,
            time_zones,
            time_filters,
            categories,
            importances,
        }
    }
}
