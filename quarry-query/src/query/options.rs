//! Options controlling how queries are compiled and materialized.

use crate::diagnostics::WarningsConfiguration;
use crate::sql::DatabaseType;
use crate::types::{ClientEvaluationBehavior, IncludeStrategy, TrackingBehavior};

/// Compilation and materialization options.
///
/// ```rust
/// use quarry_query::query::QueryOptions;
/// use quarry_query::types::{ClientEvaluationBehavior, IncludeStrategy};
///
/// let options = QueryOptions::new()
///     .client_evaluation(ClientEvaluationBehavior::Throw)
///     .include_strategy(IncludeStrategy::PreJoined);
///
/// assert_eq!(options.client_evaluation, ClientEvaluationBehavior::Throw);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// What to do with expressions the store cannot evaluate.
    pub client_evaluation: ClientEvaluationBehavior,
    /// Tracking used when a query does not say otherwise.
    pub tracking: TrackingBehavior,
    /// How included navigations are loaded.
    pub include_strategy: IncludeStrategy,
    /// SQL dialect of generated commands.
    pub database: DatabaseType,
    /// Policy for diagnostic events.
    pub warnings: WarningsConfiguration,
    /// Log compiled SQL at `info` instead of `debug`.
    pub log_queries: bool,
}

impl QueryOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client evaluation behavior.
    pub fn client_evaluation(mut self, behavior: ClientEvaluationBehavior) -> Self {
        self.client_evaluation = behavior;
        self
    }

    /// Set the default tracking behavior.
    pub fn tracking(mut self, tracking: TrackingBehavior) -> Self {
        self.tracking = tracking;
        self
    }

    /// Set the include loading strategy.
    pub fn include_strategy(mut self, strategy: IncludeStrategy) -> Self {
        self.include_strategy = strategy;
        self
    }

    /// Set the SQL dialect.
    pub fn database(mut self, database: DatabaseType) -> Self {
        self.database = database;
        self
    }

    /// Set the diagnostic event policy.
    pub fn warnings(mut self, warnings: WarningsConfiguration) -> Self {
        self.warnings = warnings;
        self
    }

    /// Log compiled SQL at `info`.
    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }
}
