//! Configuration file parsing for `quarry.toml`.
//!
//! ```toml
//! [query]
//! client_evaluation = "throw"
//! tracking = "no_tracking"
//! include_strategy = "pre_joined"
//! database = "sqlite"
//!
//! [warnings]
//! default = "log"
//! throw = ["client_evaluation"]
//!
//! [debug]
//! log_queries = true
//! ```
//!
//! Values may reference environment variables as `${NAME}`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{EventId, WarningBehavior, WarningsConfiguration, WarningsConfigurationBuilder};
use crate::error::{QueryError, QueryResult};
use crate::query::QueryOptions;
use crate::sql::DatabaseType;
use crate::types::{ClientEvaluationBehavior, IncludeStrategy, TrackingBehavior};

/// Main configuration structure for `quarry.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuarryConfig {
    /// Query compilation settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// Diagnostic event policy.
    #[serde(default)]
    pub warnings: WarningsConfig,

    /// Debug/logging settings.
    #[serde(default)]
    pub debug: DebugConfig,
}

impl QuarryConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::configuration(format!("Cannot read '{}'", path.display())).with_source(e)
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> QueryResult<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| {
            QueryError::configuration(format!("Invalid quarry.toml: {}", e.message()))
                .with_suggestion("Allowed tables are [query], [warnings] and [debug]")
                .with_source(e)
        })
    }

    /// The query options this configuration describes.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions::new()
            .client_evaluation(self.query.client_evaluation)
            .tracking(self.query.tracking)
            .include_strategy(self.query.include_strategy)
            .database(self.query.database)
            .warnings(self.warnings.build())
            .log_queries(self.debug.log_queries)
    }
}

/// `[query]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// What to do with expressions the store cannot evaluate.
    #[serde(default)]
    pub client_evaluation: ClientEvaluationBehavior,

    /// Default tracking behavior.
    #[serde(default)]
    pub tracking: TrackingBehavior,

    /// How included navigations are loaded.
    #[serde(default)]
    pub include_strategy: IncludeStrategy,

    /// SQL dialect.
    #[serde(default)]
    pub database: DatabaseType,
}

/// `[warnings]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WarningsConfig {
    /// Behavior for events not listed below.
    #[serde(default)]
    pub default: WarningBehavior,

    /// Events raised as errors.
    #[serde(default)]
    pub throw: Vec<EventId>,

    /// Events sent to the diagnostics sink.
    #[serde(default)]
    pub log: Vec<EventId>,

    /// Events dropped.
    #[serde(default)]
    pub ignore: Vec<EventId>,
}

impl WarningsConfig {
    /// Build the runtime policy. Later lists win when an event appears twice.
    pub fn build(&self) -> WarningsConfiguration {
        WarningsConfigurationBuilder::new()
            .default_behavior(self.default)
            .log(&self.log)
            .ignore(&self.ignore)
            .throw(&self.throw)
            .build()
    }
}

/// `[debug]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    /// Log every compiled command at `info`.
    #[serde(default)]
    pub log_queries: bool,
}

fn expand_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return content.to_string();
    };
    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = QuarryConfig::default();
        assert_eq!(config.query.client_evaluation, ClientEvaluationBehavior::Warn);
        assert_eq!(config.query_options(), QueryOptions::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [query]
            client_evaluation = "throw"
            tracking = "no_tracking"
            include_strategy = "pre_joined"

            [warnings]
            default = "ignore"
            throw = ["client_evaluation"]

            [debug]
            log_queries = true
        "#;

        let options = QuarryConfig::from_toml(toml).unwrap().query_options();
        assert_eq!(options.client_evaluation, ClientEvaluationBehavior::Throw);
        assert_eq!(options.tracking, TrackingBehavior::NoTracking);
        assert_eq!(options.include_strategy, IncludeStrategy::PreJoined);
        assert_eq!(
            options.warnings.behavior_for(EventId::ClientEvaluation),
            WarningBehavior::Throw
        );
        assert_eq!(
            options.warnings.behavior_for(EventId::IncludeIgnored),
            WarningBehavior::Ignore
        );
        assert!(options.log_queries);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let err = QuarryConfig::from_toml("[database]\nurl = \"x\"").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::set_var("QUARRY_TEST_CLIENT_EVAL", "silent");
        }
        let config = QuarryConfig::from_toml("[query]\nclient_evaluation = \"${QUARRY_TEST_CLIENT_EVAL}\"").unwrap();
        assert_eq!(config.query.client_evaluation, ClientEvaluationBehavior::Silent);
        assert_eq!(expand_env_vars("x = \"${QUARRY_TEST_UNSET_VAR}\""), "x = \"${QUARRY_TEST_UNSET_VAR}\"");
        unsafe {
            std::env::remove_var("QUARRY_TEST_CLIENT_EVAL");
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarry.toml");
        std::fs::write(&path, "[query]\ninclude_strategy = \"correlated\"\n").unwrap();

        let config = QuarryConfig::from_file(&path).unwrap();
        assert_eq!(config.query.include_strategy, IncludeStrategy::Correlated);
        assert!(QuarryConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
