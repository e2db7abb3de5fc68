//! Handles settings for the admin CLI. Configuration is written in
//! `paybuddy.toml`; every key has a default so the file is optional.

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    /// Log level passed to the env filter (`error`, `warn`, `info`, ...).
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Bank {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub bank: Bank,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("paybuddy").required(false))
            .set_default("app.level", "info")?
            .set_default("bank.username", "PayBuddy Bank")?
            .set_default("bank.email", "bank@paybuddy.local")?
            .build()?;

        settings.try_deserialize()
    }
}
