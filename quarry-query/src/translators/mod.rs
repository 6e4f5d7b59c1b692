//! Method-call translation.
//!
//! A [`MethodCallTranslator`] maps one method-call node to a SQL expression,
//! or returns `Ok(None)` when it does not handle the call. The
//! [`CompositeMethodCallTranslator`] tries its translators in registration
//! order and the first `Some` wins. Providers prepend their own set so their
//! translations shadow the generic ones.
//!
//! ```rust
//! use quarry_query::expression::{Expression, MethodCallExpression};
//! use quarry_query::translators::CompositeMethodCallTranslator;
//!
//! let composite = CompositeMethodCallTranslator::relational();
//! let call = match Expression::column("o", "Name").call("string", "starts_with", vec!["ab".into()]) {
//!     Expression::MethodCall(call) => call,
//!     _ => unreachable!(),
//! };
//! let translated = composite.translate(&call).unwrap();
//! assert!(matches!(translated, Expression::Like { .. }));
//! ```

mod relational;

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::QueryResult;
use crate::expression::{Expression, MethodCallExpression};

pub use relational::{ContainsTranslator, EndsWithTranslator, EqualsTranslator, StartsWithTranslator};

/// Translates method calls it recognizes.
///
/// Returning `Ok(None)` means "not mine". Errors are reserved for calls the
/// translator recognizes but that are malformed (wrong argument count).
pub trait MethodCallTranslator: Send + Sync {
    /// Translate `call`, whose object and arguments are already translated.
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>>;
}

impl<F> MethodCallTranslator for F
where
    F: Fn(&MethodCallExpression) -> QueryResult<Option<Expression>> + Send + Sync,
{
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        self(call)
    }
}

/// Ordered first-match-wins set of translators.
#[derive(Clone, Default)]
pub struct CompositeMethodCallTranslator {
    translators: Vec<Arc<dyn MethodCallTranslator>>,
}

impl CompositeMethodCallTranslator {
    /// An empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// The provider-agnostic relational set.
    pub fn relational() -> Self {
        let mut composite = Self::new();
        composite.add_translators(relational::translators());
        composite
    }

    /// Append translators after the registered ones.
    pub fn add_translators(
        &mut self,
        translators: impl IntoIterator<Item = Arc<dyn MethodCallTranslator>>,
    ) -> &mut Self {
        self.translators.extend(translators);
        self
    }

    /// Insert translators ahead of the registered ones, keeping their order.
    pub fn prepend_translators(
        &mut self,
        translators: impl IntoIterator<Item = Arc<dyn MethodCallTranslator>>,
    ) -> &mut Self {
        let mut translators: Vec<_> = translators.into_iter().collect();
        translators.append(&mut self.translators);
        self.translators = translators;
        self
    }

    /// Number of registered translators.
    pub fn len(&self) -> usize {
        self.translators.len()
    }

    /// Whether no translator is registered.
    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }

    /// The first translation, or the call itself when nothing handles it.
    pub fn translate(&self, call: &MethodCallExpression) -> QueryResult<Expression> {
        for translator in &self.translators {
            if let Some(translated) = translator.translate(call)? {
                return Ok(translated);
            }
        }
        trace!(method = %call.method, "no translator matched");
        Ok(Expression::MethodCall(call.clone()))
    }
}

impl fmt::Debug for CompositeMethodCallTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeMethodCallTranslator")
            .field("translators", &self.translators.len())
            .finish()
    }
}

/// Check the argument count of a recognized call.
pub fn expect_arguments(call: &MethodCallExpression, range: std::ops::RangeInclusive<usize>) -> QueryResult<()> {
    if range.contains(&call.arguments.len()) {
        return Ok(());
    }
    let expected = if range.start() == range.end() {
        range.start().to_string()
    } else {
        format!("{} to {}", range.start(), range.end())
    };
    Err(crate::error::QueryError::translation(format!(
        "'{}' expects {} argument(s), got {}",
        call.method,
        expected,
        call.arguments.len()
    )))
}

/// The receiver of an instance call, or an error when the call is static.
pub fn expect_object(call: &MethodCallExpression) -> QueryResult<&Expression> {
    call.object.as_deref().ok_or_else(|| {
        crate::error::QueryError::translation(format!("'{}' requires a receiver", call.method))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::MethodInfo;
    use pretty_assertions::assert_eq;

    fn call(name: &str) -> MethodCallExpression {
        MethodCallExpression::new(
            Some(Expression::column("t", "c")),
            MethodInfo::new("string", name),
            vec![],
        )
    }

    fn fixed(name: &'static str, result: &'static str) -> Arc<dyn MethodCallTranslator> {
        Arc::new(move |call: &MethodCallExpression| -> QueryResult<Option<Expression>> {
            Ok(call
                .is("string", name)
                .then(|| Expression::function(result, vec![])))
        })
    }

    #[test]
    fn test_first_match_wins() {
        let mut composite = CompositeMethodCallTranslator::new();
        composite.add_translators([fixed("f", "first"), fixed("f", "second")]);

        assert_eq!(
            composite.translate(&call("f")).unwrap(),
            Expression::function("first", vec![])
        );
    }

    #[test]
    fn test_prepended_translators_shadow() {
        let mut composite = CompositeMethodCallTranslator::new();
        composite.add_translators([fixed("f", "base")]);
        composite.prepend_translators([fixed("f", "provider"), fixed("g", "other")]);

        assert_eq!(composite.len(), 3);
        assert_eq!(
            composite.translate(&call("f")).unwrap(),
            Expression::function("provider", vec![])
        );
    }

    #[test]
    fn test_no_match_returns_call_unchanged() {
        let composite = CompositeMethodCallTranslator::relational();
        let original = call("reverse");
        assert_eq!(
            composite.translate(&original).unwrap(),
            Expression::MethodCall(original)
        );
    }

    #[test]
    fn test_malformed_call_errors() {
        let composite = CompositeMethodCallTranslator::relational();
        let err = composite.translate(&call("starts_with")).unwrap_err();
        assert!(err.is_translation_error());
    }
}
