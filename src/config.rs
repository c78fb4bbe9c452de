use crate::err::{ProtocolError, ProtocolResult};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_S: u64 = 60;

/// Settings for a protocol run.
#[derive(Clone, Deserialize, Serialize, PartialEq, Debug)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Deadline for each awaited step, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            timeout_ms: DEFAULT_TIMEOUT_S * 1000,
        }
    }
}

impl ProtocolConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        ProtocolConfig {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        let config: ProtocolConfig =
            serde_json::from_str(json).map_err(|e| ProtocolError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ProtocolResult<()> {
        if self.timeout_ms == 0 {
            return Err(ProtocolError::InvalidConfig(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[test]
fn test_from_json() {
    let config = ProtocolConfig::from_json("{}").unwrap();
    assert_eq!(Duration::from_secs(60), config.timeout());

    let config = ProtocolConfig::from_json(r#"{"timeout_ms": 1500}"#).unwrap();
    assert_eq!(Duration::from_millis(1500), config.timeout());

    assert!(matches!(
        ProtocolConfig::from_json(r#"{"timeout_ms": 0}"#),
        Err(ProtocolError::InvalidConfig(_))
    ));
    assert!(matches!(
        ProtocolConfig::from_json("not json"),
        Err(ProtocolError::InvalidConfig(_))
    ));
}
