use std::collections::HashMap;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use bridge_common::params::ParamValue;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3303")]
    pub port: u16,

    /// Base URL of the remote store operations are invoked against.
    #[envconfig(default = "http://localhost:8000/items")]
    pub remote_url: String,

    #[envconfig(default = "5000")]
    pub request_timeout: EnvMsDuration,

    /// Endpoint-level parameter defaults, as a JSON object. These lose to
    /// both per-call parameters and message header overrides.
    #[envconfig(from = "ENDPOINT_DEFAULTS", default = "{}")]
    pub endpoint_defaults: EnvParamMap,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvParamMap(pub HashMap<String, ParamValue>);

impl FromStr for EnvParamMap {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(EnvParamMap(serde_json::from_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeout_parses_milliseconds() {
        assert_eq!(
            "5000".parse::<EnvMsDuration>(),
            Ok(EnvMsDuration(time::Duration::from_millis(5000)))
        );
        assert_eq!(
            "soon".parse::<EnvMsDuration>(),
            Err(ParseEnvMsDurationError)
        );
    }

    #[test]
    fn test_endpoint_defaults_parse_from_json() {
        let parsed: EnvParamMap = r#"{"key": "item-1", "maxResults": 5}"#.parse().unwrap();

        assert_eq!(
            parsed.0.get("key"),
            Some(&ParamValue::String("item-1".to_owned()))
        );
        assert_eq!(parsed.0.get("maxResults"), Some(&ParamValue::Integer(5)));

        assert!("not json".parse::<EnvParamMap>().is_err());
    }
}
