use config::ConfigError;
use std::time::Duration;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub api: ApiSettings,
    pub storage: StorageSettings,
    pub session: SessionSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApiSettings {
    pub base_url: String,
    /// Unset by default: requests rely on the transport's own behaviour.
    pub request_timeout_secs: Option<u64>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct StorageSettings {
    pub path: String,
}

/// Session lifecycle timing
#[derive(serde::Deserialize, Clone, Debug)]
pub struct SessionSettings {
    pub expiring_soon_window_secs: i64, // 300 = refresh when less than 5 minutes remain
    pub refresh_lead_secs: i64,         // one-shot refresh fires this long before expiry
    pub check_interval_secs: u64,       // periodic re-evaluation
    pub login_route: String,
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expiring_soon_window_secs: 300,
            refresh_lead_secs: 60,
            check_interval_secs: 60,
            login_route: "/login".to_string(),
        }
    }
}

/// Load settings from defaults, an optional `configuration` file and
/// `CARRYMATE__SECTION__KEY` environment variables, in that order.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let defaults = SessionSettings::default();
    let settings = config::Config::builder()
        .set_default("api.base_url", "http://localhost:5000")?
        .set_default("storage.path", "carrymate-session.json")?
        .set_default(
            "session.expiring_soon_window_secs",
            defaults.expiring_soon_window_secs,
        )?
        .set_default("session.refresh_lead_secs", defaults.refresh_lead_secs)?
        .set_default(
            "session.check_interval_secs",
            defaults.check_interval_secs as i64,
        )?
        .set_default("session.login_route", defaults.login_route)?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("CARRYMATE")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
