use std::env;

pub const URL_ENV: &str = "PHONE_CATALOG_URL";
pub const COLLECTION_ENV: &str = "PHONE_CATALOG_COLLECTION";

/// Where the phone collection lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_url: String,
    pub collection: String,
}

impl Config {
    /// Defaults overridden by `PHONE_CATALOG_URL` and `PHONE_CATALOG_COLLECTION`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup(URL_ENV).unwrap_or(defaults.base_url),
            collection: lookup(COLLECTION_ENV).unwrap_or(defaults.collection),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            collection: "phones".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_overrides_defaults() {
        let config = Config::from_lookup(|key| match key {
            URL_ENV => Some("https://catalog.example.com".into()),
            _ => None,
        });
        assert_eq!(config.base_url, "https://catalog.example.com");
        assert_eq!(config.collection, "phones");
    }
}
