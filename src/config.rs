use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BlockError, ConfigError};

pub const MAX_TOLERANT_DECIMALS: u8 = 12;

/// How operand values are compared when deduplicating shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrictness {
    /// Operands must be numerically identical; only formatting is normalized.
    #[default]
    Exact,
    /// Operands are rounded to `decimals` places before comparison.
    Tolerant { decimals: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub strictness: MatchStrictness,
    /// Neighbourhood radius around each instance centroid, in user-space units.
    pub search_radius: f64,
    /// Width of a displacement quantization bucket on each axis.
    pub quantization_tolerance: f64,
    /// Instance pairs needed before a relative signature becomes an edge.
    pub min_support: u32,
    /// Smallest connected component emitted as a group.
    pub min_group_size: usize,
    /// Shapes occurring fewer times than this stay out of spatial clustering.
    pub min_shape_repeats: u32,
    pub parallel_pages: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            strictness: MatchStrictness::Exact,
            search_radius: 150.0,
            quantization_tolerance: 5.0,
            min_support: 3,
            min_group_size: 2,
            min_shape_repeats: 2,
            parallel_pages: true,
        }
    }
}

impl AnalysisConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BlockError> {
        let raw = fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.search_radius.is_finite() && self.search_radius > 0.0) {
            return Err(ConfigError::SearchRadius(self.search_radius));
        }
        if !(self.quantization_tolerance.is_finite() && self.quantization_tolerance > 0.0) {
            return Err(ConfigError::QuantizationTolerance(
                self.quantization_tolerance,
            ));
        }
        if self.min_support == 0 {
            return Err(ConfigError::MinSupport);
        }
        if self.min_group_size < 2 {
            return Err(ConfigError::MinGroupSize(self.min_group_size));
        }
        if self.min_shape_repeats == 0 {
            return Err(ConfigError::MinShapeRepeats);
        }
        if let MatchStrictness::Tolerant { decimals } = self.strictness {
            if decimals > MAX_TOLERANT_DECIMALS {
                return Err(ConfigError::Decimals {
                    max: MAX_TOLERANT_DECIMALS,
                    found: decimals,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_negative_radius() {
        let config = AnalysisConfig {
            search_radius: -1.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::SearchRadius(-1.0)));
    }

    #[test]
    fn rejects_nan_tolerance() {
        let config = AnalysisConfig {
            quantization_tolerance: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::QuantizationTolerance(_))
        ));
    }

    #[test]
    fn rejects_zero_support_and_tiny_groups() {
        let zero_support = AnalysisConfig {
            min_support: 0,
            ..Default::default()
        };
        assert_eq!(zero_support.validate(), Err(ConfigError::MinSupport));

        let singleton_groups = AnalysisConfig {
            min_group_size: 1,
            ..Default::default()
        };
        assert_eq!(
            singleton_groups.validate(),
            Err(ConfigError::MinGroupSize(1))
        );
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{ "search_radius": 80.0, "strictness": { "tolerant": { "decimals": 2 } } }"#,
        )
        .unwrap();
        assert_eq!(config.search_radius, 80.0);
        assert_eq!(config.strictness, MatchStrictness::Tolerant { decimals: 2 });
        assert_eq!(config.min_support, 3);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<AnalysisConfig, _> = serde_json::from_str(r#"{ "radius": 1.0 }"#);
        assert!(parsed.is_err());
    }
}
