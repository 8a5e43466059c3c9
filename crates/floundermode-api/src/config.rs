use std::str::FromStr;
use std::time::Duration;

use crate::limiter::RateLimitPolicy;
use crate::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Local,
    Airtable,
    Supabase,
}

impl FromStr for BackendKind {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "airtable" => Ok(Self::Airtable),
            "supabase" => Ok(Self::Supabase),
            other => Err(ApiError::Configuration(format!(
                "FLOUNDER_BACKEND must be `airtable`, `supabase` or `local`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirtableCredentials {
    pub api_key: String,
    pub base_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseCredentials {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTuning {
    pub rate_limit: RateLimitPolicy,
    pub default_ttl: Duration,
    pub definitions_ttl: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientTuning {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitPolicy::default(),
            default_ttl: Duration::from_secs(5 * 60),
            definitions_ttl: Duration::from_secs(2 * 60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Backend selection and credentials, read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub airtable_api_key: Option<String>,
    pub airtable_base_id: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub tuning: ClientTuning,
}

impl BackendConfig {
    /// # Errors
    /// Returns [`ApiError::Configuration`] when a variable is present but malformed.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    ///
    /// # Errors
    /// Returns [`ApiError::Configuration`] when a variable is present but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let get = |key: &str| {
            lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
        };

        let kind = get("FLOUNDER_BACKEND")
            .map(|raw| raw.parse::<BackendKind>())
            .transpose()?
            .unwrap_or_default();

        let defaults = ClientTuning::default();
        let rate_limit = RateLimitPolicy {
            max_calls: parse_number(&get, "FLOUNDER_RATE_LIMIT_CALLS")?.map_or(
                defaults.rate_limit.max_calls,
                |calls| usize::try_from(calls).unwrap_or(usize::MAX),
            ),
            window: parse_number(&get, "FLOUNDER_RATE_LIMIT_WINDOW_MS")?
                .map_or(defaults.rate_limit.window, Duration::from_millis),
            buffer: parse_number(&get, "FLOUNDER_RATE_LIMIT_BUFFER_MS")?
                .map_or(defaults.rate_limit.buffer, Duration::from_millis),
        };
        if rate_limit.max_calls == 0 {
            return Err(ApiError::Configuration(
                "FLOUNDER_RATE_LIMIT_CALLS must be at least 1".to_string(),
            ));
        }

        let tuning = ClientTuning {
            rate_limit,
            default_ttl: parse_number(&get, "FLOUNDER_CACHE_TTL_SECS")?
                .map_or(defaults.default_ttl, Duration::from_secs),
            definitions_ttl: parse_number(&get, "FLOUNDER_DEFINITIONS_TTL_SECS")?
                .map_or(defaults.definitions_ttl, Duration::from_secs),
            request_timeout: parse_number(&get, "FLOUNDER_REQUEST_TIMEOUT_MS")?
                .map_or(defaults.request_timeout, Duration::from_millis),
        };

        Ok(Self {
            kind,
            airtable_api_key: get("AIRTABLE_API_KEY"),
            airtable_base_id: get("AIRTABLE_BASE_ID"),
            supabase_url: get("SUPABASE_URL"),
            supabase_anon_key: get("SUPABASE_ANON_KEY"),
            tuning,
        })
    }

    /// # Errors
    /// Returns [`ApiError::Configuration`] naming the missing variable.
    pub fn airtable_credentials(&self) -> Result<AirtableCredentials, ApiError> {
        Ok(AirtableCredentials {
            api_key: required(self.airtable_api_key.as_ref(), "AIRTABLE_API_KEY")?,
            base_id: required(self.airtable_base_id.as_ref(), "AIRTABLE_BASE_ID")?,
        })
    }

    /// # Errors
    /// Returns [`ApiError::Configuration`] naming the missing variable.
    pub fn supabase_credentials(&self) -> Result<SupabaseCredentials, ApiError> {
        Ok(SupabaseCredentials {
            url: required(self.supabase_url.as_ref(), "SUPABASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            anon_key: required(self.supabase_anon_key.as_ref(), "SUPABASE_ANON_KEY")?,
        })
    }
}

fn required(value: Option<&String>, name: &str) -> Result<String, ApiError> {
    value
        .cloned()
        .ok_or_else(|| ApiError::Configuration(format!("{name} is not set")))
}

fn parse_number(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, ApiError> {
    get(key)
        .map(|raw| {
            raw.parse::<u64>().map_err(|err| {
                ApiError::Configuration(format!("{key} must be a non-negative integer: {err}"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_local_backend_with_documented_tuning() -> Result<(), ApiError> {
        let config = BackendConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config.kind, BackendKind::Local);
        assert_eq!(config.tuning.rate_limit.max_calls, 5);
        assert_eq!(config.tuning.rate_limit.window, Duration::from_millis(1000));
        assert_eq!(config.tuning.rate_limit.buffer, Duration::from_millis(100));
        assert_eq!(config.tuning.default_ttl, Duration::from_secs(300));
        assert_eq!(config.tuning.definitions_ttl, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn missing_credentials_name_the_variable() -> Result<(), ApiError> {
        let config = BackendConfig::from_lookup(lookup(&[
            ("FLOUNDER_BACKEND", "airtable"),
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "  "),
        ]))?;
        assert_eq!(config.kind, BackendKind::Airtable);
        match config.airtable_credentials() {
            Err(ApiError::Configuration(message)) => assert!(message.contains("AIRTABLE_BASE_ID")),
            other => panic!("expected configuration error, got {other:?}"),
        }
        assert!(matches!(config.supabase_credentials(), Err(ApiError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            BackendConfig::from_lookup(lookup(&[("FLOUNDER_BACKEND", "firebase")])),
            Err(ApiError::Configuration(_))
        ));
        assert!(matches!(
            BackendConfig::from_lookup(lookup(&[("FLOUNDER_RATE_LIMIT_CALLS", "five")])),
            Err(ApiError::Configuration(_))
        ));
        assert!(matches!(
            BackendConfig::from_lookup(lookup(&[("FLOUNDER_RATE_LIMIT_CALLS", "0")])),
            Err(ApiError::Configuration(_))
        ));
    }
}
