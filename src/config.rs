//! Configuration management for the annotation engine

use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::anchor::SelectionConstraints;
use crate::html::HighlightConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub selection: SelectionConstraints,
    pub highlight: HighlightConfig,
    pub markers: MarkerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerConfig {
    /// Create markers on the next frame instead of immediately
    pub defer_creation: bool,
}

/// Invalid configuration values
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Selection bounds are inverted: min {min} > max {max}")]
    InvertedBounds { min: usize, max: usize },
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let config = Config {
            selection: SelectionConstraints {
                min_len: parse_var("ANCHOR_MIN_LEN", defaults.selection.min_len)?,
                max_len: parse_var("ANCHOR_MAX_LEN", defaults.selection.max_len)?,
            },
            highlight: HighlightConfig {
                class_prefix: env::var("HIGHLIGHT_CLASS_PREFIX")
                    .unwrap_or(defaults.highlight.class_prefix),
                include_inline_styles: parse_var(
                    "HIGHLIGHT_INLINE_STYLES",
                    defaults.highlight.include_inline_styles,
                )?,
                ..defaults.highlight
            },
            markers: MarkerConfig {
                defer_creation: parse_var(
                    "MARKER_DEFER_CREATION",
                    defaults.markers.defer_creation,
                )?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selection.min_len > self.selection.max_len {
            return Err(ConfigError::InvertedBounds {
                min: self.selection.min_len,
                max: self.selection.max_len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.selection.min_len, 1);
        assert_eq!(config.selection.max_len, 2000);
        assert_eq!(config.highlight.class_prefix, "ll-highlight");
        assert!(!config.markers.defer_creation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env() {
        // only test that touches the process environment
        env::set_var("ANCHOR_MIN_LEN", "3");
        env::set_var("MARKER_DEFER_CREATION", "true");
        let config = Config::from_env().unwrap();
        assert_eq!(config.selection.min_len, 3);
        assert!(config.markers.defer_creation);

        env::set_var("ANCHOR_MAX_LEN", "lots");
        assert_eq!(
            Config::from_env(),
            Err(ConfigError::InvalidValue {
                key: "ANCHOR_MAX_LEN".to_string(),
                value: "lots".to_string(),
            })
        );

        env::set_var("ANCHOR_MAX_LEN", "2");
        assert_eq!(
            Config::from_env(),
            Err(ConfigError::InvertedBounds { min: 3, max: 2 })
        );

        for key in ["ANCHOR_MIN_LEN", "ANCHOR_MAX_LEN", "MARKER_DEFER_CREATION"] {
            env::remove_var(key);
        }
    }
}
