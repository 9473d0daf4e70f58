use std::env;

use chrono::Duration;
use fulfillment_engine::{
    helpers::{DiscountSchedule, DiscountTier},
    CheckoutSettings,
};
use log::*;
use sfg_common::{Money, Secret};

use crate::auth::ApiKeyRegistry;

const DEFAULT_SFG_HOST: &str = "127.0.0.1";
const DEFAULT_SFG_PORT: u16 = 8360;
const DEFAULT_ORDER_EXPIRY: Duration = Duration::hours(24);
const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;
const DEFAULT_RATE_LIMIT_MAX: u32 = 10;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// The shared secret the payment processor includes in webhook calls. Unset means fail-closed: every webhook
    /// call is rejected.
    pub webhook_secret: Option<Secret<String>>,
    /// The shared secret the cron invoker sends in the `sfg-cron-secret` header. Unset means fail-closed: the
    /// sweepers refuse to run.
    pub cron_secret: Option<Secret<String>>,
    /// Staff API keys and the roles they carry.
    pub api_keys: ApiKeyRegistry,
    /// The age at which a pending order is swept to expired.
    pub order_expiry: Duration,
    pub low_stock_threshold: i64,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    pub checkout: CheckoutSettings,
    pub processor: ProcessorConfig,
    pub tracker: TrackerConfig,
    pub notifier: NotifierConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SFG_HOST.to_string(),
            port: DEFAULT_SFG_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            webhook_secret: None,
            cron_secret: None,
            api_keys: ApiKeyRegistry::default(),
            order_expiry: DEFAULT_ORDER_EXPIRY,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            checkout: CheckoutSettings::default(),
            processor: ProcessorConfig::default(),
            tracker: TrackerConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("SFG_HOST").ok().unwrap_or_else(|| DEFAULT_SFG_HOST.into());
        let port = env::var("SFG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SFG_PORT. {e} Using the default, {DEFAULT_SFG_PORT}, instead."
                    );
                    DEFAULT_SFG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SFG_PORT);
        let database_url = env::var("SFG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SFG_DATABASE_URL is not set. Please set it to the URL for the SFG database.");
            String::default()
        });
        let use_x_forwarded_for =
            env::var("SFG_USE_X_FORWARDED_FOR").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let use_forwarded = env::var("SFG_USE_FORWARDED").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let webhook_secret = read_secret("SFG_WEBHOOK_SECRET", "payment webhook calls will all be rejected");
        let cron_secret = read_secret("SFG_CRON_SECRET", "the cron sweepers will refuse to run");
        let api_keys = ApiKeyRegistry::from_env_var(env::var("SFG_API_KEYS").ok());
        let order_expiry = env::var("SFG_ORDER_EXPIRY_HOURS")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::hours)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for SFG_ORDER_EXPIRY_HOURS. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_ORDER_EXPIRY);
        let low_stock_threshold = parse_var("SFG_LOW_STOCK_THRESHOLD", DEFAULT_LOW_STOCK_THRESHOLD);
        let rate_limit_max = parse_var("SFG_RATE_LIMIT_MAX", DEFAULT_RATE_LIMIT_MAX);
        let rate_limit_window_secs = parse_var("SFG_RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS);
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            webhook_secret,
            cron_secret,
            api_keys,
            order_expiry,
            low_stock_threshold,
            rate_limit_max,
            rate_limit_window_secs,
            checkout: checkout_settings_from_env(),
            processor: ProcessorConfig::from_env_or_default(),
            tracker: TrackerConfig::from_env_or_default(),
            notifier: NotifierConfig::from_env_or_default(),
        }
    }
}

fn read_secret(var: &str, consequence: &str) -> Option<Secret<String>> {
    match env::var(var) {
        Ok(s) if !s.trim().is_empty() => Some(Secret::new(s)),
        _ => {
            warn!("🪛️ {var} is not set; {consequence}.");
            None
        },
    }
}

fn parse_var<T: std::str::FromStr + Copy + std::fmt::Display>(var: &str, default: T) -> T
where T::Err: std::fmt::Display {
    env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<T>().map_err(|e| warn!("🪛️ Invalid value for {var}: {e}. Using the default, {default}.")).ok()
        })
        .unwrap_or(default)
}

fn checkout_settings_from_env() -> CheckoutSettings {
    let defaults = CheckoutSettings::default();
    let sku = env::var("SFG_SKU").ok().unwrap_or(defaults.sku);
    let base_price = env::var("SFG_BASE_PRICE")
        .ok()
        .and_then(|s| s.parse::<i64>().map_err(|e| warn!("🪛️ Invalid SFG_BASE_PRICE: {e}")).ok())
        .map(Money::from)
        .unwrap_or(defaults.base_price);
    let max_quantity = parse_var("SFG_MAX_QUANTITY", defaults.max_quantity);
    // Tiers are configured as "min_qty:pct" pairs, e.g. "50:20,20:15,10:10,5:5"
    let schedule = env::var("SFG_DISCOUNT_TIERS")
        .ok()
        .map(|s| {
            let tiers = s
                .split(',')
                .filter_map(|pair| {
                    let (qty, pct) = pair.split_once(':')?;
                    match (qty.trim().parse::<u32>(), pct.trim().parse::<u8>()) {
                        (Ok(min_quantity), Ok(percent_off)) => Some(DiscountTier { min_quantity, percent_off }),
                        _ => {
                            warn!("🪛️ Ignoring invalid tier ({pair}) in SFG_DISCOUNT_TIERS");
                            None
                        },
                    }
                })
                .collect::<Vec<_>>();
            DiscountSchedule::new(tiers)
        })
        .unwrap_or(defaults.schedule);
    CheckoutSettings { sku, base_price, max_quantity, schedule }
}

//-------------------------------------------  ServerOptions  ---------------------------------------------------------
/// The subset of the configuration that request handlers need. Kept small, and kept free of secrets, so it can be
/// passed around the app without care.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}

//-------------------------------------------  WebhookOptions  --------------------------------------------------------
/// What the payment webhook handler needs: just the shared secret. `None` is fail-closed.
#[derive(Clone, Debug, Default)]
pub struct WebhookOptions {
    pub secret: Option<Secret<String>>,
}

//-------------------------------------------    CronOptions   --------------------------------------------------------
/// What the cron endpoints need. A missing secret is fail-closed: the sweepers refuse to run rather than running
/// open.
#[derive(Clone, Debug)]
pub struct CronOptions {
    pub secret: Option<Secret<String>>,
    pub order_expiry: Duration,
}

impl Default for CronOptions {
    fn default() -> Self {
        Self { secret: None, order_expiry: DEFAULT_ORDER_EXPIRY }
    }
}

//-------------------------------------------  ProcessorConfig  -------------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct ProcessorConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
}

impl ProcessorConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env::var("SFG_PROCESSOR_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SFG_PROCESSOR_URL is not set. Checkout will fail until it is configured.");
            String::default()
        });
        let api_key = Secret::new(env::var("SFG_PROCESSOR_API_KEY").ok().unwrap_or_default());
        Self { base_url, api_key }
    }
}

//-------------------------------------------   TrackerConfig  --------------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct TrackerConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
}

impl TrackerConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env::var("SFG_TRACKER_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SFG_TRACKER_URL is not set. Delivery sweeps will report every lookup as failed.");
            String::default()
        });
        let api_key = Secret::new(env::var("SFG_TRACKER_API_KEY").ok().unwrap_or_default());
        Self { base_url, api_key }
    }
}

//-------------------------------------------   NotifierConfig  -------------------------------------------------------
/// Where notifications go. When `relay_url` is unset the notifier logs instead of sending, which keeps every
/// notification path best-effort in development too.
#[derive(Clone, Debug, Default)]
pub struct NotifierConfig {
    pub relay_url: Option<String>,
    pub admin_contact: String,
}

impl NotifierConfig {
    pub fn from_env_or_default() -> Self {
        let relay_url = env::var("SFG_NOTIFY_RELAY_URL").ok().filter(|s| !s.trim().is_empty());
        if relay_url.is_none() {
            info!("🪛️ SFG_NOTIFY_RELAY_URL is not set. Notifications will be logged only.");
        }
        let admin_contact = env::var("SFG_ADMIN_CONTACT").ok().unwrap_or_default();
        Self { relay_url, admin_contact }
    }
}
