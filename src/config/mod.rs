use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub login_max_attempts: u32,
    pub login_lockout_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub package_scheduler_interval_secs: u64,
    pub subscription_grace_days: u64,
    pub payfast: PayfastConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PayfastConfig {
    pub merchant_id: String,
    pub merchant_key: String,
    pub passphrase: Option<String>,
    pub sandbox: bool,
    /// Confirm every ITN with the gateway's validate endpoint.
    pub validate_remote: bool,
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .unwrap_or_else(|_| "24h".into())
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: parse_or("SERVER_PORT", 8000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            login_max_attempts: parse_or("LOGIN_MAX_ATTEMPTS", 5),
            login_lockout_secs: parse_or("LOGIN_LOCKOUT_SECS", 900),
            rate_limit_window_secs: parse_or("RATE_LIMIT_WINDOW", 60),
            rate_limit_requests: parse_or("RATE_LIMIT_REQUESTS", 120),
            package_scheduler_interval_secs: parse_or("PACKAGE_SCHEDULER_INTERVAL", 300),
            subscription_grace_days: parse_or("SUBSCRIPTION_GRACE_DAYS", 7),
            payfast: PayfastConfig {
                merchant_id: env::var("PAYFAST_MERCHANT_ID")?,
                merchant_key: env::var("PAYFAST_MERCHANT_KEY")?,
                passphrase: env::var("PAYFAST_PASSPHRASE")
                    .ok()
                    .filter(|p| !p.trim().is_empty()),
                sandbox: parse_or("PAYFAST_SANDBOX", true),
                validate_remote: parse_or("PAYFAST_VALIDATE_REMOTE", true),
                return_url: env::var("PAYFAST_RETURN_URL")?,
                cancel_url: env::var("PAYFAST_CANCEL_URL")?,
                notify_url: env::var("PAYFAST_NOTIFY_URL")?,
            },
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn login_lockout(&self) -> Duration {
        Duration::from_secs(self.login_lockout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn package_scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.package_scheduler_interval_secs)
    }

    /// How long paid features outlive an unrenewed period.
    pub fn subscription_grace(&self) -> chrono::TimeDelta {
        i64::try_from(self.subscription_grace_days)
            .ok()
            .and_then(chrono::TimeDelta::try_days)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

impl PayfastConfig {
    pub fn host(&self) -> &'static str {
        if self.sandbox {
            "https://sandbox.payfast.co.za"
        } else {
            "https://www.payfast.co.za"
        }
    }

    pub fn process_url(&self) -> String {
        format!("{}/eng/process", self.host())
    }

    pub fn validate_url(&self) -> String {
        format!("{}/eng/query/validate", self.host())
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
