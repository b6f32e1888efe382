use crate::core::errors::{ColexError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the collective coordination layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordConfig {
    /// Maximum number of participants allowed in one group
    pub max_group_size: usize,
    /// In-flight step ids per graph before the sequencer starts warning
    pub max_in_flight_steps: usize,
    /// Whether a missing capability terminates the process instead of
    /// returning `Unimplemented`. Production backends keep this on: asking
    /// a backend for a capability it was not built with is a deployment
    /// mismatch, not a runtime condition.
    pub unimplemented_is_fatal: bool,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            max_group_size: 256,
            max_in_flight_steps: 1024,
            unimplemented_is_fatal: true,
        }
    }
}

impl CoordConfig {
    /// Config suitable for tests: missing capabilities surface as errors
    /// rather than aborting the test process.
    pub fn for_testing() -> Self {
        Self {
            max_group_size: 16,
            max_in_flight_steps: 64,
            unimplemented_is_fatal: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_group_size == 0 {
            return Err(ColexError::configuration_field(
                "max_group_size must be greater than 0",
                "max_group_size",
            ));
        }
        if self.max_in_flight_steps == 0 {
            return Err(ColexError::configuration_field(
                "max_in_flight_steps must be greater than 0",
                "max_in_flight_steps",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(CoordConfig::default().validate().is_ok());
        assert!(CoordConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_zero_group_size_rejected() {
        let mut config = CoordConfig::default();
        config.max_group_size = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = CoordConfig::for_testing();
        config.max_in_flight_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: CoordConfig = serde_json::from_str(
            r#"{
                "max_group_size": 8,
                "max_in_flight_steps": 32,
                "unimplemented_is_fatal": false
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_group_size, 8);
        assert!(config.validate().is_ok());
    }
}
