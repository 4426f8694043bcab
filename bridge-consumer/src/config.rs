use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(default = "consumer")]
    pub consumer_name: String,

    /// Base URL of the remote store we poll items from.
    #[envconfig(default = "http://localhost:8000/items")]
    pub source_url: NonEmptyString,

    /// URL work unit payloads are forwarded to.
    #[envconfig(default = "http://localhost:8000/sink")]
    pub sink_url: NonEmptyString,

    #[envconfig(default = "1000")]
    pub poll_interval: EnvMsDuration,

    #[envconfig(default = "5000")]
    pub request_timeout: EnvMsDuration,

    /// Cap on the number of items requested per poll cycle.
    #[envconfig(default = "100")]
    pub batch_limit: usize,

    #[envconfig(default = "10")]
    pub max_in_flight: usize,

    /// Suppress items whose key was already consumed successfully.
    #[envconfig(default = "true")]
    pub deduplicate: bool,

    /// Delete items from the remote store after successful processing.
    #[envconfig(default = "true")]
    pub cleanup_on_success: bool,

    #[envconfig(default = "10000")]
    pub fingerprint_capacity: usize,

    #[envconfig(default = "30")]
    pub liveness_deadline_seconds: i64,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
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

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_ms_duration_parses_milliseconds() {
        let parsed: EnvMsDuration = "1500".parse().unwrap();
        assert_eq!(parsed.0, time::Duration::from_millis(1500));

        assert_eq!(
            "not-a-number".parse::<EnvMsDuration>(),
            Err(ParseEnvMsDurationError)
        );
    }

    #[test]
    fn test_non_empty_string_rejects_empty() {
        assert!("consumer".parse::<NonEmptyString>().is_ok());
        assert_eq!("".parse::<NonEmptyString>().unwrap_err(), StringIsEmptyError);
    }
}
