use std::env;

use crate::models::Plan;

const SECONDS_PER_DAY: i64 = 86400;

/// Price and duration for one plan tier.
#[derive(Debug, Clone, Copy)]
pub struct PlanTerms {
    /// Price in whole KES (M-Pesa amounts carry no cents).
    pub price: i64,
    pub duration_days: i64,
}

/// Explicit plan pricing/duration table.
///
/// Constructed once at startup and handed to the initiation service and the
/// entitlement ledger; the `Plan` enum being closed means every lookup is
/// total - there is no fallback branch for an unknown tier.
#[derive(Debug, Clone, Copy)]
pub struct PlanTable {
    daily: PlanTerms,
    weekly: PlanTerms,
    monthly: PlanTerms,
}

impl PlanTable {
    pub fn new(daily: PlanTerms, weekly: PlanTerms, monthly: PlanTerms) -> Self {
        Self { daily, weekly, monthly }
    }

    pub fn terms(&self, plan: Plan) -> PlanTerms {
        match plan {
            Plan::Daily => self.daily,
            Plan::Weekly => self.weekly,
            Plan::Monthly => self.monthly,
        }
    }

    pub fn price(&self, plan: Plan) -> i64 {
        self.terms(plan).price
    }

    pub fn duration_secs(&self, plan: Plan) -> i64 {
        self.terms(plan).duration_days * SECONDS_PER_DAY
    }

    fn from_env() -> Self {
        Self {
            daily: PlanTerms {
                price: env_i64("PLAN_DAILY_PRICE", 50),
                duration_days: env_i64("PLAN_DAILY_DAYS", 1),
            },
            weekly: PlanTerms {
                price: env_i64("PLAN_WEEKLY_PRICE", 250),
                duration_days: env_i64("PLAN_WEEKLY_DAYS", 7),
            },
            monthly: PlanTerms {
                price: env_i64("PLAN_MONTHLY_PRICE", 700),
                duration_days: env_i64("PLAN_MONTHLY_DAYS", 30),
            },
        }
    }
}

impl Default for PlanTable {
    fn default() -> Self {
        Self {
            daily: PlanTerms { price: 50, duration_days: 1 },
            weekly: PlanTerms { price: 250, duration_days: 7 },
            monthly: PlanTerms { price: 700, duration_days: 30 },
        }
    }
}

/// Daraja environment selector (different base URLs, same API shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnv {
    Sandbox,
    Production,
}

impl MpesaEnv {
    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnv::Sandbox => "https://sandbox.safaricom.co.ke",
            MpesaEnv::Production => "https://api.safaricom.co.ke",
        }
    }

    /// Only the two exact names are recognized. A typo must not silently
    /// select an environment.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sandbox" => Some(MpesaEnv::Sandbox),
            "production" => Some(MpesaEnv::Production),
            _ => None,
        }
    }
}

/// Pre-shared Daraja credentials and endpoint selection.
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub env: MpesaEnv,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Paybill/till number (BusinessShortCode).
    pub short_code: String,
    /// Merchant passkey used to build the STK push password.
    pub passkey: String,
    /// Public URL Daraja will POST the result callback to.
    pub callback_url: String,
}

impl MpesaConfig {
    fn from_env(base_url: &str) -> Self {
        let env_name = env::var("MPESA_ENV").unwrap_or_else(|_| "sandbox".to_string());
        let mpesa_env = MpesaEnv::parse(&env_name).unwrap_or_else(|| {
            tracing::warn!(
                "unrecognized MPESA_ENV {:?}, falling back to sandbox",
                env_name
            );
            MpesaEnv::Sandbox
        });

        Self {
            env: mpesa_env,
            consumer_key: env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
            short_code: env::var("MPESA_SHORT_CODE").unwrap_or_else(|_| "174379".to_string()),
            passkey: env::var("MPESA_PASSKEY").unwrap_or_default(),
            callback_url: env::var("MPESA_CALLBACK_URL")
                .unwrap_or_else(|_| format!("{}/payments/callback", base_url)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    pub mpesa: MpesaConfig,
    pub plans: PlanTable,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("PESATIPS_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "pesatips.db".to_string()),
            mpesa: MpesaConfig::from_env(&base_url),
            plans: PlanTable::from_env(),
            base_url,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpesa_env_parse_is_exact() {
        assert_eq!(MpesaEnv::parse("sandbox"), Some(MpesaEnv::Sandbox));
        assert_eq!(MpesaEnv::parse("production"), Some(MpesaEnv::Production));
        assert_eq!(MpesaEnv::parse("prod"), None);
        assert_eq!(MpesaEnv::parse("Production"), None);
        assert_eq!(MpesaEnv::parse(""), None);
    }

    #[test]
    fn test_plan_table_defaults() {
        let plans = PlanTable::default();
        assert_eq!(plans.price(Plan::Daily), 50);
        assert_eq!(plans.price(Plan::Weekly), 250);
        assert_eq!(plans.price(Plan::Monthly), 700);
        assert_eq!(plans.duration_secs(Plan::Daily), 86400);
        assert_eq!(plans.duration_secs(Plan::Weekly), 7 * 86400);
        assert_eq!(plans.duration_secs(Plan::Monthly), 30 * 86400);
    }
}
