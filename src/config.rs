use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlissConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
    pub accrual: AccrualConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub rpc_port: u16,
    pub db_path: String,
    pub log_level: String,
    /// Public URL embedded in verification links.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "http://localhost:9200".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// HMAC key for session tokens. Must be overridden in production.
    pub session_secret: String,
    pub session_ttl_days: i64,
    pub verify_token_ttl_hours: i64,
    /// The single accepted referral code. Blank referrals are always allowed.
    pub referral_code: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    #[serde(default = "default_demo_password")]
    pub demo_password: String,
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

fn default_demo_password() -> String {
    "password123".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MailConfig {
    /// HTTP relay endpoint that accepts {to, subject, html}. None disables delivery.
    pub relay_url: Option<String>,
    pub from_address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AccrualConfig {
    pub tick_secs: u64,
}

impl Default for BlissConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                rpc_port: 9200,
                db_path: "./data/bliss".to_string(),
                log_level: "info".to_string(),
                base_url: default_base_url(),
            },
            auth: AuthConfig {
                session_secret: "please-set-a-secret".to_string(),
                session_ttl_days: 7,
                verify_token_ttl_hours: 24,
                referral_code: "tmdf28dns".to_string(),
                admin_password: default_admin_password(),
                demo_password: default_demo_password(),
            },
            mail: MailConfig {
                relay_url: None,
                from_address: "no-reply@profitbliss.com".to_string(),
            },
            accrual: AccrualConfig { tick_secs: 60 },
        }
    }
}

impl BlissConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        println!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        println!("Config parse error in {} ({}), using defaults", path, e);
                        Self::default()
                    }
                },
                Err(e) => {
                    println!("Could not read {} ({}), using defaults", path, e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        }
    }
}
