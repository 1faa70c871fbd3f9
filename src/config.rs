use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer};

use crate::model::identity::Pin;

/// Application configuration, derived from `Votesmart.toml` and `VOTESMART_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default)]
    store_path: Option<PathBuf>,
    #[serde(default = "default_max_pin_attempts")]
    max_pin_attempts: u8,
    admin_email: String,
    admin_name: String,
    // secrets
    signing_secret: String,
    admin_password: String,
    #[serde(deserialize_with = "deserialize_pin")]
    admin_pin: Pin,
}

fn default_max_pin_attempts() -> u8 {
    3
}

impl Config {
    /// Load from `Votesmart.toml` in the working directory, overridden by
    /// `VOTESMART_*` environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment("Votesmart.toml").extract()
    }

    /// Load from a specific TOML file, still honouring the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("VOTESMART_"))
    }

    /// Where the store lives. `None` keeps everything in memory.
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// Consecutive wrong PINs allowed before a login is abandoned.
    pub fn max_pin_attempts(&self) -> u8 {
        self.max_pin_attempts
    }

    /// Secret key used to sign vote tokens.
    pub fn signing_secret(&self) -> &[u8] {
        self.signing_secret.as_bytes()
    }

    /// Email of the administrator seeded on first start.
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    pub fn admin_name(&self) -> &str {
        &self.admin_name
    }

    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }

    pub fn admin_pin(&self) -> Pin {
        self.admin_pin
    }
}

/// Environment values such as `0042` arrive as integers, so accept either form.
fn deserialize_pin<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pin, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPin {
        Text(String),
        Number(u16),
    }

    let text = match RawPin::deserialize(deserializer)? {
        RawPin::Text(text) => text,
        RawPin::Number(number) => format!("{number:04}"),
    };
    text.parse().map_err(serde::de::Error::custom)
}


#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn loads_toml_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Votesmart.toml",
                r#"
                    signing_secret = "from toml"
                    admin_email = "admin@votesmart.test"
                    admin_name = "Returning Officer"
                    admin_password = "admin-password"
                    admin_pin = "0000"
                "#,
            )?;
            jail.set_env("VOTESMART_SIGNING_SECRET", "from env");
            jail.set_env("VOTESMART_ADMIN_PIN", "0042");
            let config = Config::load()?;
            assert_eq!(config.signing_secret(), b"from env");
            assert_eq!(config.admin_pin().to_string(), "0042");
            assert_eq!(config.max_pin_attempts(), 3);
            assert!(config.store_path().is_none());
            Ok(())
        });
    }

    #[test]
    fn missing_secret_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("Votesmart.toml", "admin_email = \"a@b.c\"")?;
            assert!(Config::load().is_err());
            Ok(())
        });
    }
}
