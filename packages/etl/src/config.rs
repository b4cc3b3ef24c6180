//! Loading and validating `meli_etl.toml`.

use std::path::Path;
use std::time::Duration;

use meli_etl_models::{EtlConfig, Track};
use meli_etl_source::retry::RetryPolicy;
use meli_etl_source::{SearchQuery, is_currency_code};
use meli_etl_warehouse_models::{TableRef, is_identifier};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "meli_etl.toml";

/// Errors from reading or validating the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// Config file path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or a required key is missing.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A key is present but its value is unusable.
    #[error("Invalid config value for `{key}`: {message}")]
    Invalid {
        /// Offending key.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Reads and validates the config at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read, does not parse, or
/// fails validation.
pub fn load(path: &Path) -> Result<EtlConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let config = parse(&text)?;
    log::info!(
        "Loaded config {}: site={} query={:?} dataset={}",
        path.display(),
        config.site,
        config.query,
        config.dataset
    );
    Ok(config)
}

/// Parses and validates config text.
///
/// # Errors
///
/// Returns [`ConfigError`] if the text does not parse or fails validation.
pub fn parse(text: &str) -> Result<EtlConfig, ConfigError> {
    let config: EtlConfig = toml::from_str(text)?;
    validate(&config)?;
    Ok(config)
}

/// Checks values that parse but cannot be used.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the first bad key.
pub fn validate(config: &EtlConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("site", &config.site),
        ("query", &config.query),
        ("api_url", &config.api_url),
    ] {
        if value.trim().is_empty() {
            return Err(invalid(key, "must not be empty"));
        }
    }

    if let Some(condition) = &config.condition
        && condition.trim().is_empty()
    {
        return Err(invalid("condition", "must not be empty when set"));
    }

    if !is_identifier(&config.dataset) {
        return Err(invalid(
            "dataset",
            format!("{:?} is not a valid identifier", config.dataset),
        ));
    }

    for track in Track::ALL {
        let name = config.tables.for_track(track);
        if !is_identifier(name) {
            return Err(invalid(
                &format!("tables.{track}"),
                format!("{name:?} is not a valid identifier"),
            ));
        }
    }

    if config.currency_pairs.is_empty() {
        return Err(invalid("currency_pairs", "at least one pair is required"));
    }
    for pair in &config.currency_pairs {
        for code in [&pair.base, &pair.quote] {
            if !is_currency_code(code) {
                return Err(invalid(
                    "currency_pairs",
                    format!("{code:?} is not a three-letter uppercase currency code"),
                ));
            }
        }
    }

    if config.page_size == 0 {
        return Err(invalid("page_size", "must be greater than zero"));
    }
    if config.timeout_secs == 0 {
        return Err(invalid("timeout_secs", "must be greater than zero"));
    }

    Ok(())
}

/// Builds the search shared by the items and sellers tracks.
#[must_use]
pub fn search_query(config: &EtlConfig) -> SearchQuery {
    SearchQuery {
        condition: config.condition.clone(),
        item_attributes: config.items_attributes.clone(),
        page_size: config.page_size,
        max_items: config.max_items.filter(|&max| max > 0),
        ..SearchQuery::new(&config.site, &config.query)
    }
}

/// Converts the `[retry]` section.
#[must_use]
pub const fn retry_policy(config: &EtlConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: config.retry.max_retries,
        base_delay: Duration::from_millis(config.retry.base_delay_ms),
        max_delay: Duration::from_millis(config.retry.max_delay_ms),
    }
}

/// Destination table of `track`.
#[must_use]
pub fn table_ref(config: &EtlConfig, track: Track) -> TableRef {
    TableRef::new(&config.dataset, config.tables.for_track(track))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        site = "MLA"
        query = "chromecast"
        dataset = "meli"

        [[currency_pairs]]
        base = "ARS"
        quote = "USD"

        [tables]
        items = "items_details"
        sellers = "sellers_details"
        currency = "currency_conversions"
    "#;

    #[test]
    fn parses_minimal_config() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.site, "MLA");
        assert_eq!(config.currency_pairs.len(), 1);
        assert_eq!(
            table_ref(&config, Track::Currency).to_string(),
            "meli.currency_conversions"
        );
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let text = MINIMAL.replace("dataset = \"meli\"", "");
        assert!(matches!(parse(&text), Err(ConfigError::Parse(_))));

        let text = MINIMAL.replace("query = \"chromecast\"", "");
        assert!(matches!(parse(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn empty_values_are_rejected() {
        let text = MINIMAL.replace("site = \"MLA\"", "site = \"  \"");
        assert!(matches!(
            parse(&text),
            Err(ConfigError::Invalid { key, .. }) if key == "site"
        ));
    }

    #[test]
    fn bad_identifiers_are_rejected() {
        let text = MINIMAL.replace("dataset = \"meli\"", "dataset = \"meli-prod\"");
        assert!(matches!(
            parse(&text),
            Err(ConfigError::Invalid { key, .. }) if key == "dataset"
        ));

        let text = MINIMAL.replace("sellers = \"sellers_details\"", "sellers = \"x;y\"");
        assert!(matches!(
            parse(&text),
            Err(ConfigError::Invalid { key, .. }) if key == "tables.sellers"
        ));
    }

    #[test]
    fn bad_currency_codes_are_rejected() {
        let text = MINIMAL.replace("quote = \"USD\"", "quote = \"usd\"");
        assert!(matches!(
            parse(&text),
            Err(ConfigError::Invalid { key, .. }) if key == "currency_pairs"
        ));
    }

    #[test]
    fn empty_currency_pairs_are_rejected() {
        let text = MINIMAL.replace(
            "[[currency_pairs]]\n        base = \"ARS\"\n        quote = \"USD\"",
            "currency_pairs = []",
        );
        assert!(matches!(
            parse(&text),
            Err(ConfigError::Invalid { key, .. }) if key == "currency_pairs"
        ));
    }

    #[test]
    fn builds_search_query() {
        let text = format!("condition = \"new\"\nmax_items = 0\n{MINIMAL}");
        let config = parse(&text).unwrap();
        let query = search_query(&config);

        assert_eq!(query.site, "MLA");
        assert_eq!(query.condition.as_deref(), Some("new"));
        assert_eq!(query.max_items, None);
        assert_eq!(query.page_size, 50);
    }

    #[test]
    fn converts_retry_section() {
        let text = format!("{MINIMAL}\n[retry]\nmax_retries = 1\nbase_delay_ms = 10\n");
        let policy = retry_policy(&parse(&text).unwrap());

        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(8_000));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
