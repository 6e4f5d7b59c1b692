//! Error types for query translation, materialization and execution.
//!
//! Every failure surfaced by the pipeline is a [`QueryError`] carrying an
//! [`ErrorCode`], a message, and optional [`ErrorContext`] (the entity type,
//! member, SQL text and suggestions involved).
//!
//! # Error Codes
//!
//! Error codes follow a pattern: P{category}{number}
//! - 1xxx: Translation errors (unknown member, untranslatable call, ...)
//! - 2xxx: Compatibility errors (navigation shape does not match its target)
//! - 3xxx: Resource errors (connection, command, reader failures)
//! - 4xxx: Execution errors (cancellation, client evaluation, warnings as errors)
//! - 6xxx: Data errors (conversion, serialization)
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use quarry_query::{ErrorCategory, ErrorCode, QueryError};
//!
//! let err = QueryError::navigation_not_found("Order", "Lnes");
//! assert_eq!(err.code, ErrorCode::NavigationNotFound);
//! assert_eq!(err.category(), ErrorCategory::Translation);
//! assert!(err.to_string().starts_with("[Q1002]"));
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Translation errors (1xxx)
    /// An expression could not be translated to SQL (Q1001).
    TranslationFailed = 1001,
    /// A navigation name does not exist on the source shape (Q1002).
    NavigationNotFound = 1002,
    /// An entity type is unknown or has no table (Q1003).
    EntityTypeNotFound = 1003,
    /// A member does not map to a column (Q1004).
    MemberNotFound = 1004,
    /// Client evaluation was required while disallowed (Q1005).
    ClientEvaluationDisallowed = 1005,
    /// The query operators are composed in an unsupported way (Q1006).
    InvalidQueryShape = 1006,
    /// A named query parameter was not supplied (Q1007).
    ParameterMissing = 1007,

    // Compatibility errors (2xxx)
    /// Navigation runtime shape does not match its target (Q2001).
    IncompatibleNavigation = 2001,
    /// Navigation points at an entity without a runtime type (Q2002).
    NavigationToShadowEntity = 2002,
    /// An entity instance does not fit the collection it was added to (Q2003).
    IncompatibleEntity = 2003,

    // Resource errors (3xxx)
    /// Opening or using the connection failed (Q3001).
    ConnectionFailed = 3001,
    /// The command failed to execute (Q3002).
    CommandFailed = 3002,
    /// Reading a row from the result stream failed (Q3003).
    ReaderFailed = 3003,

    // Execution errors (4xxx)
    /// The operation was cancelled (Q4001).
    Cancelled = 4001,
    /// An in-process expression failed to evaluate (Q4002).
    ClientEvaluationFailed = 4002,
    /// A diagnostic event configured to throw was raised (Q4003).
    WarningAsError = 4003,
    /// An object was used outside of its lifecycle (Q4004).
    InvalidState = 4004,

    // Data errors (6xxx)
    /// A value had an unexpected type (Q6001).
    InvalidDataType = 6001,
    /// Serialization failed (Q6002).
    SerializationError = 6002,

    // Configuration errors (7xxx)
    /// Invalid configuration (Q7001).
    InvalidConfiguration = 7001,
    /// Invalid metadata model (Q7002).
    InvalidModel = 7002,

    // Internal errors (9xxx)
    /// Internal error (Q9001).
    Internal = 9001,
}

/// Coarse error taxonomy used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The query tree cannot be turned into a command.
    Translation,
    /// Metadata runtime shapes disagree.
    Compatibility,
    /// The store or the command executor failed.
    Resource,
    /// The running query was aborted.
    Execution,
    /// Value conversion failed.
    Data,
    /// Options or model are invalid.
    Configuration,
    /// Bug.
    Internal,
}

impl ErrorCode {
    /// Get the error code string (e.g., "Q1001").
    pub fn code(&self) -> String {
        format!("Q{}", *self as u16)
    }

    /// Get the category this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match *self as u16 {
            1000..=1999 => ErrorCategory::Translation,
            2000..=2999 => ErrorCategory::Compatibility,
            3000..=3999 => ErrorCategory::Resource,
            4000..=4999 => ErrorCategory::Execution,
            6000..=6999 => ErrorCategory::Data,
            7000..=7999 => ErrorCategory::Configuration,
            _ => ErrorCategory::Internal,
        }
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::TranslationFailed => "Expression could not be translated",
            Self::NavigationNotFound => "Navigation not found",
            Self::EntityTypeNotFound => "Entity type not found",
            Self::MemberNotFound => "Member not found",
            Self::ClientEvaluationDisallowed => "Client evaluation disallowed",
            Self::InvalidQueryShape => "Invalid query shape",
            Self::ParameterMissing => "Query parameter missing",
            Self::IncompatibleNavigation => "Incompatible navigation type",
            Self::NavigationToShadowEntity => "Navigation to shadow entity",
            Self::IncompatibleEntity => "Incompatible entity instance",
            Self::ConnectionFailed => "Connection failed",
            Self::CommandFailed => "Command failed",
            Self::ReaderFailed => "Reading results failed",
            Self::Cancelled => "Operation cancelled",
            Self::ClientEvaluationFailed => "Client evaluation failed",
            Self::WarningAsError => "Warning raised as error",
            Self::InvalidState => "Invalid state",
            Self::InvalidDataType => "Invalid data type",
            Self::SerializationError => "Serialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::InvalidModel => "Invalid model",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
    /// Optional code example.
    pub code: Option<String>,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            code: None,
        }
    }

    /// Add a code example.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The entity type involved.
    pub entity_type: Option<String>,
    /// The member or navigation involved.
    pub member: Option<String>,
    /// The SQL text (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur during query operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Add a code suggestion.
    pub fn with_code_suggestion(mut self, text: impl Into<String>, code: impl Into<String>) -> Self {
        self.context
            .suggestions
            .push(Suggestion::new(text).with_code(code));
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the entity type.
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.context.entity_type = Some(entity_type.into());
        self
    }

    /// Set the member.
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.context.member = Some(member.into());
        self
    }

    /// Set the SQL text.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a generic translation error.
    pub fn translation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TranslationFailed, message)
    }

    /// An expression could not be translated and client evaluation is disallowed.
    pub fn client_evaluation_disallowed(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        Self::new(
            ErrorCode::ClientEvaluationDisallowed,
            format!(
                "The expression '{}' could not be translated and will not be evaluated locally",
                expression
            ),
        )
        .with_suggestion("Rewrite the expression using translatable members")
        .with_code_suggestion(
            "Allow in-process evaluation for this query",
            "QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Warn)",
        )
    }

    /// A navigation name does not exist on the source shape.
    pub fn navigation_not_found(entity_type: impl Into<String>, navigation: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let navigation = navigation.into();
        Self::new(
            ErrorCode::NavigationNotFound,
            format!(
                "The navigation '{}' is not defined on entity type '{}'",
                navigation, entity_type
            ),
        )
        .with_entity_type(&entity_type)
        .with_member(&navigation)
        .with_suggestion("Check the include path for typos")
    }

    /// An entity type is unknown or cannot be queried.
    pub fn entity_type_not_found(entity_type: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        Self::new(
            ErrorCode::EntityTypeNotFound,
            format!("Entity type '{}' is not mapped to a table", entity_type),
        )
        .with_entity_type(&entity_type)
    }

    /// A member does not map to a column.
    pub fn member_not_found(entity_type: impl Into<String>, member: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let member = member.into();
        Self::new(
            ErrorCode::MemberNotFound,
            format!("'{}' has no mapped member '{}'", entity_type, member),
        )
        .with_entity_type(&entity_type)
        .with_member(&member)
    }

    /// The query operators cannot be combined as written.
    pub fn invalid_query_shape(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidQueryShape, message)
    }

    /// A query parameter referenced by the command was not supplied.
    pub fn parameter_missing(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::ParameterMissing,
            format!("No value supplied for query parameter '{}'", name),
        )
        .with_member(&name)
    }

    /// The navigation's runtime property cannot hold the target entity type.
    pub fn incompatible_navigation(
        code: ErrorCode,
        navigation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, message).with_member(navigation)
    }

    /// An entity object was added to a collection it does not fit.
    pub fn incompatible_entity(entity_type: impl Into<String>, navigation: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let navigation = navigation.into();
        Self::new(
            ErrorCode::IncompatibleEntity,
            format!(
                "An entity of type '{}' cannot be added to the collection navigation '{}'",
                entity_type, navigation
            ),
        )
        .with_entity_type(&entity_type)
        .with_member(&navigation)
    }

    /// The underlying store failed.
    pub fn resource(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    /// A command failed to execute.
    pub fn command(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CommandFailed, message)
            .with_suggestion("Check the store logs for more details")
    }

    /// The running query was cancelled.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "The query was cancelled")
    }

    /// A client-side expression failed at runtime.
    pub fn client_evaluation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ClientEvaluationFailed, message)
    }

    /// An object was used in the wrong lifecycle state.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    /// A value had an unexpected type.
    pub fn data_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidDataType, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Create a model validation error.
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidModel, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
            .with_help("This is likely a bug in Quarry")
    }

    // ============== Error Checks ==============

    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Check if this error was raised while translating a query.
    pub fn is_translation_error(&self) -> bool {
        self.category() == ErrorCategory::Translation
    }

    /// Check if this error is a runtime-shape mismatch.
    pub fn is_compatibility_error(&self) -> bool {
        self.category() == ErrorCategory::Compatibility
    }

    /// Check if this error came from the store.
    pub fn is_resource_error(&self) -> bool {
        self.category() == ErrorCategory::Resource
    }

    /// Check if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref entity_type) = self.context.entity_type {
            output.push_str(&format!("  → Entity type: {}\n", entity_type));
        }
        if let Some(ref member) = self.context.member {
            output.push_str(&format!("  → Member: {}\n", member));
        }
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.len() > 200 {
                format!("{}...", sql.chars().take(200).collect::<String>())
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!(
                        "     ```\n     {}\n     ```\n",
                        code.replace('\n', "\n     ")
                    ));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

/// Helper for creating errors with context.
#[macro_export]
macro_rules! query_error {
    ($code:expr, $msg:expr) => {
        $crate::error::QueryError::new($code, $msg)
    };
    ($code:expr, $msg:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        let mut err = $crate::error::QueryError::new($code, $msg);
        $(
            err = err.$key($value);
        )+
        err
    }};
}
