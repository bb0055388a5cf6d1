use crate::error::AppError;
use crate::models::PeriodKind;
use crate::source::cost_explorer::CostExplorerClient;
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "billing-monitor";
pub const HOME_ENV: &str = "BILLING_MONITOR_HOME";
const ENV_PREFIX: &str = "BILLING_MONITOR";

pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

pub const REQUIRED_SECRETS: [&str; 2] = [ACCESS_KEY_ID, SECRET_ACCESS_KEY];
pub const OPTIONAL_SECRETS: [&str; 2] = [SESSION_TOKEN, WEBHOOK_URL];

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "billing-monitor", SERVICE_NAME) {
        let candidate = dirs.config_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".billing-monitor"))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub billing: BillingSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BillingSettings {
    pub period_kind: PeriodKind,
    pub period_count: u32,
    pub region: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub min_cost_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_credits: Decimal,
    pub endpoint: Option<String>,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            period_kind: PeriodKind::Months,
            period_count: 1,
            region: "us-east-1".into(),
            currency: "USD".into(),
            min_cost_threshold: Decimal::new(1, 2),
            total_credits: Decimal::from(5000),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub channel: String,
    pub webhook_url: Option<String>,
    pub alert_on_low_credit: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: "#billing-alerts".into(),
            webhook_url: None,
            alert_on_low_credit: true,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let billing = &self.billing;
        if billing.period_count < 1 {
            return Err(AppError::Config(format!(
                "period_count must be at least 1 (got {}).",
                billing.period_count
            )));
        }
        if billing.min_cost_threshold < Decimal::ZERO {
            return Err(AppError::Config(
                "min_cost_threshold must be a non-negative number.".into(),
            ));
        }
        if billing.total_credits < Decimal::ZERO {
            return Err(AppError::Config(
                "total_credits must be a non-negative number.".into(),
            ));
        }
        if billing.currency.trim().is_empty() {
            return Err(AppError::Config("currency must not be empty.".into()));
        }
        if billing.region.trim().is_empty() {
            return Err(AppError::Config("region must not be empty.".into()));
        }
        if let Some(endpoint) = &billing.endpoint {
            url::Url::parse(endpoint)
                .map_err(|e| AppError::Config(format!("Invalid endpoint '{endpoint}': {e}")))?;
        }
        Ok(())
    }

    pub fn cost_endpoint(&self) -> String {
        self.billing
            .endpoint
            .clone()
            .unwrap_or_else(|| CostExplorerClient::default_endpoint(&self.billing.region))
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    Ok(())
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, AppError> {
    let settings = ::config::Config::builder()
        .add_source(
            ::config::File::from(path)
                .format(::config::FileFormat::Toml)
                .required(false),
        )
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings
        .try_deserialize::<AppConfig>()
        .map_err(|e| AppError::Config(e.to_string()))
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &mask(&self.access_key_id))
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

pub fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    if value.chars().count() <= 4 {
        "*".repeat(value.chars().count())
    } else {
        format!("{visible}{}", "*".repeat(value.chars().count() - 4))
    }
}

fn is_known_secret(name: &str) -> bool {
    REQUIRED_SECRETS.contains(&name) || OPTIONAL_SECRETS.contains(&name)
}

// Entries are scoped to the app home, so separate homes keep separate secrets.
fn secret_entry(home: &Path, name: &str) -> keyring::Result<keyring::Entry> {
    keyring::Entry::new(SERVICE_NAME, &format!("secret:{name}@{}", home.display()))
}

pub fn set_secret(name: &str, value: &str) -> Result<(), AppError> {
    let name = name.trim().to_ascii_uppercase();
    if !is_known_secret(&name) {
        return Err(AppError::Config(format!(
            "Unknown secret '{name}'. Expected one of {}, {}.",
            REQUIRED_SECRETS.join(", "),
            OPTIONAL_SECRETS.join(", ")
        )));
    }
    if value.trim().is_empty() {
        return Err(AppError::Config(format!("Secret '{name}' must not be empty.")));
    }

    let home = app_home_dir()?;
    secret_entry(&home, &name)
        .and_then(|entry| entry.set_password(value))
        .map_err(|e| {
            AppError::Credential(format!("Could not store {name} in the system keyring: {e}"))
        })?;

    match secret_entry(&home, &name).and_then(|entry| entry.get_password()) {
        Ok(stored) if stored == value => Ok(()),
        _ => Err(AppError::Credential(format!(
            "The system keyring did not keep {name}; set it in the environment instead."
        ))),
    }
}

pub fn get_secret(name: &str) -> Option<String> {
    let stored = app_home_dir()
        .ok()
        .and_then(|home| secret_entry(&home, name).ok())
        .and_then(|entry| entry.get_password().ok())
        .filter(|value| !value.is_empty());

    stored.or_else(|| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
}

pub fn load_credentials() -> Result<Credentials, AppError> {
    let access_key_id = get_secret(ACCESS_KEY_ID);
    let secret_access_key = get_secret(SECRET_ACCESS_KEY);

    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token: get_secret(SESSION_TOKEN),
        }),
        (access_key_id, secret_access_key) => {
            let missing: Vec<&str> = [
                (ACCESS_KEY_ID, access_key_id.is_none()),
                (SECRET_ACCESS_KEY, secret_access_key.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect();
            Err(AppError::Credential(format!(
                "Missing required secrets: {}. Set them in the environment or with `{SERVICE_NAME} set-secret`.",
                missing.join(", ")
            )))
        }
    }
}

pub fn webhook_url(config: &AppConfig) -> Option<String> {
    get_secret(WEBHOOK_URL).or_else(|| {
        config
            .notifications
            .webhook_url
            .clone()
            .filter(|v| !v.trim().is_empty())
    })
}
