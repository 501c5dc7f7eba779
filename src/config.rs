use std::fs;
use std::io::ErrorKind;

use serde::Deserialize;

use crate::error::AppError;

#[derive(Deserialize, Debug, Default)]
pub struct PostgresConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub dbname: Option<String>,
    pub password: Option<String>,
}

/// Accepted field names for rate records, tried in order.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RateFieldNames {
    #[serde(default = "default_currency_keys")]
    pub currency_keys: Vec<String>,
    #[serde(default = "default_value_keys")]
    pub value_keys: Vec<String>,
}

fn default_currency_keys() -> Vec<String> {
    vec!["sign".to_owned(), "currency".to_owned()]
}

fn default_value_keys() -> Vec<String> {
    vec!["value".to_owned(), "rate".to_owned()]
}

impl Default for RateFieldNames {
    fn default() -> Self {
        RateFieldNames {
            currency_keys: default_currency_keys(),
            value_keys: default_value_keys(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ConvertConfig {
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub rate: RateFieldNames,
}

impl ConvertConfig {
    /// A missing file yields the defaults; a file that exists must parse.
    pub fn load(path: &str) -> Result<ConvertConfig, AppError> {
        match fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s).map_err(|source| AppError::Config { path: path.to_owned(), source }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no configuration at {}, using defaults", path);
                Ok(ConvertConfig::default())
            },
            Err(source) => Err(AppError::Io { path: path.to_owned(), source }),
        }
    }
}

#[test]
fn test_config_defaults() {
    let config: ConvertConfig = toml::from_str("").unwrap();
    assert!(config.postgres.host.is_none());
    assert_eq!(config.rate, RateFieldNames::default());
    assert_eq!(config.rate.currency_keys, vec!["sign", "currency"]);
}

#[test]
fn test_config_parse() {
    let config: ConvertConfig = toml::from_str(r#"
        [postgres]
        host = "db.internal"
        port = 6543
        dbname = "staff"

        [rate]
        currency_keys = ["currency"]
    "#).unwrap();

    assert_eq!(config.postgres.host.as_deref(), Some("db.internal"));
    assert_eq!(config.postgres.port, Some(6543));
    assert_eq!(config.postgres.dbname.as_deref(), Some("staff"));
    assert!(config.postgres.password.is_none());
    assert_eq!(config.rate.currency_keys, vec!["currency"]);
    assert_eq!(config.rate.value_keys, vec!["value", "rate"]);
}

#[test]
fn test_config_missing_file() {
    let config = ConvertConfig::load("config/does-not-exist.toml").unwrap();
    assert!(config.postgres.dbname.is_none());
}
