use std::{env, fs, path::Path, time::Duration};

use crate::{
    dedup::{DEFAULT_KEY_PREFIX, DEFAULT_TTL},
    domain::{ChatId, Filter},
    errors::Error,
    scheduler::ScheduleConfig,
    Result,
};

pub const DEFAULT_KWORK_API_URL: &str = "https://api.kwork.ru";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Typed configuration, assembled once at process start.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub notify_chat_id: ChatId,
    pub acl_user_ids: Vec<i64>,

    // Kwork account + query
    pub kwork_login: String,
    pub kwork_password: String,
    pub kwork_phone_last: Option<String>,
    pub kwork_api_url: String,
    pub kwork_categories: Vec<i64>,
    pub kwork_price_from: Option<u64>,
    pub kwork_price_to: Option<u64>,
    pub kwork_hiring_from: Option<u32>,
    pub kwork_offers_from: Option<u32>,
    pub kwork_offers_to: Option<u32>,
    pub kwork_query: Option<String>,
    pub http_timeout: Duration,

    // Dedup store
    pub redis_url: String,
    pub dedup_ttl: Duration,
    pub dedup_key_prefix: String,

    // Delivery pacing
    pub pacing_delays: Vec<Duration>,

    // Scheduler
    pub poll_interval: Duration,
    pub scheduler_max_instances: usize,
    pub scheduler_misfire_grace: Duration,

    pub log_level: String,
}

impl Config {
    /// Load from the process environment, after an optional `.env` file.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&lookup);

        let telegram_bot_token = vars.required("BOT_TOKEN")?;
        let notify_chat_id = vars
            .parsed::<i64>("BOT_NOTIFY_USER_ID")?
            .ok_or_else(|| missing("BOT_NOTIFY_USER_ID"))?;
        let mut acl_user_ids = vars.csv_i64("BOT_ACL_USER_IDS")?;
        if acl_user_ids.is_empty() {
            acl_user_ids.push(notify_chat_id);
        }

        let kwork_login = vars.required("KWORK_LOGIN")?;
        let kwork_password = vars.required("KWORK_PASSWORD")?;
        let kwork_phone_last = vars.str("KWORK_PHONE_LAST");
        let kwork_api_url = vars
            .str("KWORK_API_URL")
            .unwrap_or_else(|| DEFAULT_KWORK_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let kwork_categories = vars.csv_i64("KWORK_CATEGORIES")?;
        if kwork_categories.is_empty() {
            return Err(missing("KWORK_CATEGORIES"));
        }
        let kwork_price_from = vars.parsed::<u64>("KWORK_PRICE_FROM")?;
        let kwork_price_to = vars.parsed::<u64>("KWORK_PRICE_TO")?;
        if let (Some(from), Some(to)) = (kwork_price_from, kwork_price_to) {
            if from > to {
                return Err(Error::Config(format!(
                    "KWORK_PRICE_FROM ({from}) is greater than KWORK_PRICE_TO ({to})"
                )));
            }
        }
        let kwork_hiring_from = vars.parsed::<u32>("KWORK_HIRING_FROM")?;
        if kwork_hiring_from.is_some_and(|h| h > 100) {
            return Err(Error::Config(
                "KWORK_HIRING_FROM must be a percentage (0-100)".to_string(),
            ));
        }
        let kwork_offers_from = vars.parsed::<u32>("KWORK_KWORKS_FILTER_FROM")?;
        let kwork_offers_to = vars.parsed::<u32>("KWORK_KWORKS_FILTER_TO")?;
        let kwork_query = vars.str("KWORK_QUERY");
        let http_timeout =
            Duration::from_secs(vars.parsed::<u64>("HTTP_TIMEOUT_SECONDS")?.unwrap_or(30));

        let redis_url = match vars.str("REDIS_URL") {
            Some(url) => url,
            None => {
                let host = vars.str("REDIS_HOST").unwrap_or_else(|| "localhost".to_string());
                let port = vars.parsed::<u16>("REDIS_PORT")?.unwrap_or(6379);
                let db = vars.parsed::<u32>("REDIS_DB")?.unwrap_or(0);
                format!("redis://{host}:{port}/{db}")
            }
        };
        let dedup_ttl = vars
            .parsed::<u64>("DEDUP_TTL_SECONDS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL);
        if dedup_ttl.is_zero() {
            return Err(Error::Config("DEDUP_TTL_SECONDS must be > 0".to_string()));
        }
        let dedup_key_prefix = vars
            .str("DEDUP_KEY_PREFIX")
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

        let pacing_delays = match vars.str("PACING_DELAYS_SECONDS") {
            Some(raw) => parse_csv::<u64>("PACING_DELAYS_SECONDS", &raw)?
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            None => vec![1, 2, 3].into_iter().map(Duration::from_secs).collect(),
        };

        let poll_minutes = vars
            .parsed::<u64>("SCHEDULE_PARSE_KWORK_MINUTES")?
            .unwrap_or(10);
        if poll_minutes == 0 {
            return Err(Error::Config(
                "SCHEDULE_PARSE_KWORK_MINUTES must be > 0".to_string(),
            ));
        }
        let poll_interval = Duration::from_secs(poll_minutes * 60);
        let scheduler_max_instances = vars
            .parsed::<usize>("SCHEDULER_MAX_INSTANCES")?
            .unwrap_or(3)
            .max(1);
        let scheduler_misfire_grace = Duration::from_secs(
            vars.parsed::<u64>("SCHEDULER_MISFIRE_GRACE_SECONDS")?
                .unwrap_or(3600),
        );

        let log_level = vars.str("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string());
        if !LOG_LEVELS.contains(&log_level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "LOG_LEVEL must be one of {}, got {log_level:?}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(Self {
            telegram_bot_token,
            notify_chat_id: ChatId(notify_chat_id),
            acl_user_ids,
            kwork_login,
            kwork_password,
            kwork_phone_last,
            kwork_api_url,
            kwork_categories,
            kwork_price_from,
            kwork_price_to,
            kwork_hiring_from,
            kwork_offers_from,
            kwork_offers_to,
            kwork_query,
            http_timeout,
            redis_url,
            dedup_ttl,
            dedup_key_prefix,
            pacing_delays,
            poll_interval,
            scheduler_max_instances,
            scheduler_misfire_grace,
            log_level,
        })
    }

    pub fn filter(&self) -> Filter {
        Filter {
            categories: self.kwork_categories.clone(),
            price_from: self.kwork_price_from,
            price_to: self.kwork_price_to,
            hiring_from: self.kwork_hiring_from,
            offers_from: self.kwork_offers_from,
            offers_to: self.kwork_offers_to,
            query: self.kwork_query.clone(),
        }
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            interval: self.poll_interval,
            max_instances: self.scheduler_max_instances,
            misfire_grace: self.scheduler_misfire_grace,
        }
    }
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    /// Trimmed, non-empty value.
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.str(key).ok_or_else(|| missing(key))
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.str(key) else {
            return Ok(None);
        };
        raw.parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw:?}")))
    }

    fn csv_i64(&self, key: &str) -> Result<Vec<i64>> {
        match self.str(key) {
            Some(raw) => parse_csv(key, &raw),
            None => Ok(Vec::new()),
        }
    }
}

fn missing(key: &str) -> Error {
    Error::Config(format!("{key} environment variable is required"))
}

/// Comma separated list; a JSON-style `[1, 2]` wrapper is tolerated.
fn parse_csv<T: std::str::FromStr>(key: &str, raw: &str) -> Result<Vec<T>> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| Error::Config(format!("{key} has an invalid item: {s:?}")))
        })
        .collect()
}

/// Read `KEY=value` lines from `path` into the environment.
///
/// Variables already present in the environment are never overridden.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue;
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }
        out.push((key.to_string(), val));
    }
    out
}
