use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::identity::MatchPolicy;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {name}: '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{name} references unset variable ${{{var}}}")]
    UnsetReference { name: &'static str, var: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLogKind {
    Postgres,
    InMemory,
}

/// Which halves of the service this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    All,
    Recorder,
    Querier,
}

impl ServiceRole {
    pub fn records(&self) -> bool {
        matches!(self, Self::All | Self::Recorder)
    }

    pub fn queries(&self) -> bool {
        matches!(self, Self::All | Self::Querier)
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Recorder => write!(f, "recorder"),
            Self::Querier => write!(f, "querier"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    None,
    InMemory,
    Nats,
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::InMemory => write!(f, "inmemory"),
            Self::Nats => write!(f, "nats"),
        }
    }
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub event_log: EventLogKind,
    pub role: ServiceRole,
    pub host: String,
    pub port: u16,
    pub bus_type: BusType,
    pub nats_url: String,
    pub ingest_subject: String,
    pub query_timeout: Duration,
    pub match_policy: MatchPolicy,
    pub max_graph_depth: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let event_log = match var("EVENT_LOG", "postgres").to_lowercase().as_str() {
            "postgres" => EventLogKind::Postgres,
            "inmemory" => EventLogKind::InMemory,
            other => return Err(invalid("EVENT_LOG", other)),
        };

        let database_url = match lookup("DATABASE_URL") {
            Some(raw) => Some(expand_env(&raw, "DATABASE_URL", &lookup)?),
            None if event_log == EventLogKind::Postgres => {
                return Err(ConfigError::Missing("DATABASE_URL"))
            }
            None => None,
        };

        let role = match var("SERVICE_ROLE", "all").to_lowercase().as_str() {
            "all" => ServiceRole::All,
            "recorder" => ServiceRole::Recorder,
            "querier" => ServiceRole::Querier,
            other => return Err(invalid("SERVICE_ROLE", other)),
        };

        let bus_type = match var("BUS_TYPE", "none").to_lowercase().as_str() {
            "none" => BusType::None,
            "inmemory" => BusType::InMemory,
            "nats" => BusType::Nats,
            other => return Err(invalid("BUS_TYPE", other)),
        };

        let port = parse("PORT", var("PORT", "8080"))?;
        let query_timeout_ms: u64 = parse("QUERY_TIMEOUT_MS", var("QUERY_TIMEOUT_MS", "5000"))?;
        let match_policy: MatchPolicy = parse("OWNER_MATCH_POLICY", var("OWNER_MATCH_POLICY", "exact"))?;
        let max_graph_depth: usize = parse("MAX_GRAPH_DEPTH", var("MAX_GRAPH_DEPTH", "8"))?;
        if max_graph_depth == 0 {
            return Err(invalid("MAX_GRAPH_DEPTH", "0"));
        }

        Ok(Config {
            database_url,
            event_log,
            role,
            host: var("HOST", "0.0.0.0"),
            port,
            bus_type,
            nats_url: var("NATS_URL", "nats://localhost:4222"),
            ingest_subject: var("INGEST_SUBJECT", "timesink.events.>"),
            query_timeout: Duration::from_millis(query_timeout_ms),
            match_policy,
            max_graph_depth,
        })
    }
}

fn invalid(name: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid { name, value })
}

/// Replace `${VAR}` references with values from `lookup`
pub fn expand_env<F>(raw: &str, name: &'static str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| invalid(name, raw))?;
        let var = &after[..end];
        let value = lookup(var).ok_or_else(|| ConfigError::UnsetReference {
            name,
            var: var.to_string(),
        })?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db/ts")])).unwrap();
        assert_eq!(config.event_log, EventLogKind::Postgres);
        assert_eq!(config.role, ServiceRole::All);
        assert_eq!(config.bus_type, BusType::None);
        assert_eq!(config.port, 8080);
        assert_eq!(config.query_timeout, Duration::from_millis(5000));
        assert_eq!(config.match_policy, MatchPolicy::Exact);
        assert_eq!(config.max_graph_depth, 8);
        assert_eq!(config.ingest_subject, "timesink.events.>");
    }

    #[test]
    fn test_database_url_required_for_postgres() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));

        let config = Config::from_lookup(lookup(&[("EVENT_LOG", "inmemory")])).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_database_url_expands_references() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://${PGUSER}:${PGPASSWORD}@db/ts"),
            ("PGUSER", "sink"),
            ("PGPASSWORD", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://sink:s3cret@db/ts"));
    }

    #[test]
    fn test_unset_reference_is_an_error() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://${NOPE}@db")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsetReference { var, .. } if var == "NOPE"));
    }

    #[test]
    fn test_rejects_unknown_values() {
        let base = [("EVENT_LOG", "inmemory")];
        for (key, value) in [
            ("SERVICE_ROLE", "writer"),
            ("BUS_TYPE", "kafka"),
            ("OWNER_MATCH_POLICY", "fuzzy"),
            ("MAX_GRAPH_DEPTH", "0"),
            ("PORT", "http"),
        ] {
            let mut vars = base.to_vec();
            vars.push((key, value));
            assert!(Config::from_lookup(lookup(&vars)).is_err(), "{} accepted", key);
        }
    }

    #[test]
    fn test_role_flags() {
        assert!(ServiceRole::All.records() && ServiceRole::All.queries());
        assert!(!ServiceRole::Recorder.queries());
        assert!(!ServiceRole::Querier.records());
    }
}
