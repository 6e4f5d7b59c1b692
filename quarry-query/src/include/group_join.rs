//! The synchronous include chain.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::loader::{LoaderFactory, RelatedEntitiesLoader};
use crate::error::{QueryError, QueryResult};
use crate::metadata::NavigationId;
use crate::query::QueryContext;
use crate::tracking::EntityRef;

/// One include path plus the factories of its loaders.
#[derive(Clone)]
pub struct IncludeStep {
    /// Navigations from the included source, outermost first.
    pub path: Vec<NavigationId>,
    /// One factory per navigation in `path`.
    pub factories: Vec<LoaderFactory>,
    /// Whether included entities are tracked.
    pub requires_tracking: bool,
}

impl IncludeStep {
    /// Create a step.
    pub fn new(path: Vec<NavigationId>, factories: Vec<LoaderFactory>, requires_tracking: bool) -> Self {
        Self {
            path,
            factories,
            requires_tracking,
        }
    }
}

impl fmt::Debug for IncludeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncludeStep")
            .field("path", &self.path)
            .field("factories", &self.factories.len())
            .field("requires_tracking", &self.requires_tracking)
            .finish()
    }
}

/// Ordered include steps bound to one query execution.
///
/// Steps run oldest first. The chain is armed by [`initialize`], used once
/// per materialized entity through [`include`], and released by [`dispose`]
/// (also run on drop).
///
/// [`initialize`]: Self::initialize
/// [`include`]: Self::include
/// [`dispose`]: Self::dispose
#[derive(Default)]
pub struct GroupJoinInclude {
    steps: VecDeque<IncludeStep>,
    loaders: Vec<Vec<Box<dyn RelatedEntitiesLoader>>>,
    context: Option<Arc<QueryContext>>,
}

impl GroupJoinInclude {
    /// A chain with a single step.
    pub fn new(step: IncludeStep) -> Self {
        let mut chain = Self::default();
        chain.push(step);
        chain
    }

    /// Append a step after the existing ones.
    pub fn push(&mut self, step: IncludeStep) {
        self.steps.push_back(step);
    }

    /// Run the steps of `previous` before the steps of this chain.
    ///
    /// Repeated calls place each new predecessor ahead of the earlier ones.
    pub fn set_previous(&mut self, mut previous: GroupJoinInclude) -> QueryResult<()> {
        if self.context.is_some() || previous.context.is_some() {
            return Err(QueryError::invalid_state(
                "Include chains cannot be linked after initialization",
            ));
        }
        for step in std::mem::take(&mut previous.steps).into_iter().rev() {
            self.steps.push_front(step);
        }
        Ok(())
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &IncludeStep> {
        self.steps.iter()
    }

    /// Whether the chain is bound to an execution.
    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// Bind to an execution: open one include scope per step and create its loaders.
    pub fn initialize(&mut self, context: Arc<QueryContext>) -> QueryResult<()> {
        if self.context.is_some() {
            return Err(QueryError::invalid_state("Include chain is already initialized"));
        }
        self.context = Some(context.clone());

        let mut failure = None;
        for step in &self.steps {
            let mut loaders = Vec::with_capacity(step.factories.len());
            for factory in &step.factories {
                match factory(&context) {
                    Ok(loader) => loaders.push(loader),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            if failure.is_some() {
                for mut loader in loaders {
                    loader.dispose();
                }
                break;
            }
            context.begin_include_scope();
            self.loaders.push(loaders);
        }
        if let Some(err) = failure {
            self.dispose();
            return Err(err);
        }

        debug!(steps = self.steps.len(), "include chain initialized");
        Ok(())
    }

    /// Attach every step's navigations to `entity`, oldest step first.
    pub fn include(&mut self, entity: Option<&EntityRef>) -> QueryResult<()> {
        let context = self
            .context
            .clone()
            .ok_or_else(|| QueryError::invalid_state("Include chain used before initialization"))?;

        for (step, loaders) in self.steps.iter().zip(self.loaders.iter_mut()) {
            context
                .buffer()
                .include(&context, entity, &step.path, loaders, step.requires_tracking)?;
        }
        Ok(())
    }

    /// Dispose every loader and close the include scopes, oldest step first.
    ///
    /// Does nothing when the chain is not bound.
    pub fn dispose(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        for loaders in self.loaders.drain(..) {
            for mut loader in loaders {
                loader.dispose();
            }
            context.end_include_scope();
        }
        debug!(steps = self.steps.len(), "include chain disposed");
    }
}

impl Drop for GroupJoinInclude {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for GroupJoinInclude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupJoinInclude")
            .field("steps", &self.steps)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockExecutor, RecordingLoader, order_model, test_context};
    use crate::value::Value;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    type Log = Arc<Mutex<Vec<String>>>;

    fn step(model: &crate::metadata::Model, name: &'static str, log: &Log) -> IncludeStep {
        let navigation = model.find_navigation("Order", "Lines").unwrap().id();
        let log = log.clone();
        let factory: LoaderFactory = Arc::new(move |_: &QueryContext| -> QueryResult<Box<dyn RelatedEntitiesLoader>> {
            log.lock().push(format!("create {}", name));
            Ok(Box::new(RecordingLoader::new(name, log.clone())))
        });
        IncludeStep::new(vec![navigation], vec![factory], true)
    }

    fn order(context: &QueryContext) -> EntityRef {
        let model = context.model().clone();
        let et = model.entity_type("Order").unwrap();
        context
            .buffer()
            .get_entity(context, et, &[Value::Int(1), Value::from("ada")], true)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_set_previous_orders_predecessors_first() {
        let model = order_model();
        let log: Log = Arc::default();

        let mut chain = GroupJoinInclude::new(step(&model, "c", &log));
        chain.set_previous(GroupJoinInclude::new(step(&model, "b", &log))).unwrap();
        chain.set_previous(GroupJoinInclude::new(step(&model, "a", &log))).unwrap();

        let context = test_context(model, MockExecutor::new());
        chain.initialize(context.clone()).unwrap();
        chain.include(Some(&order(&context))).unwrap();
        chain.dispose();

        assert_eq!(
            *log.lock(),
            vec![
                "create a", "create b", "create c", "load a", "load b", "load c", "dispose a",
                "dispose b", "dispose c",
            ]
        );
        assert_eq!(context.include_scope_depth(), 0);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let model = order_model();
        let log: Log = Arc::default();
        let mut chain = GroupJoinInclude::new(step(&model, "a", &log));

        chain.dispose();
        assert!(log.lock().is_empty());

        let context = test_context(model, MockExecutor::new());
        chain.initialize(context.clone()).unwrap();
        assert_eq!(context.include_scope_depth(), 1);

        chain.dispose();
        chain.dispose();
        drop(chain);

        assert_eq!(*log.lock(), vec!["create a", "dispose a"]);
        assert_eq!(context.include_scope_depth(), 0);
    }

    #[test]
    fn test_initialize_twice_fails() {
        let model = order_model();
        let log: Log = Arc::default();
        let mut chain = GroupJoinInclude::new(step(&model, "a", &log));
        let context = test_context(model, MockExecutor::new());

        chain.initialize(context.clone()).unwrap();
        assert!(chain.initialize(context).is_err());
    }

    #[test]
    fn test_drop_disposes() {
        let model = order_model();
        let log: Log = Arc::default();
        let context = test_context(model.clone(), MockExecutor::new());
        {
            let mut chain = GroupJoinInclude::new(step(&model, "a", &log));
            chain.initialize(context.clone()).unwrap();
        }
        assert_eq!(*log.lock(), vec!["create a", "dispose a"]);
        assert_eq!(context.include_scope_depth(), 0);
    }

    #[test]
    fn test_include_before_initialize_fails() {
        let model = order_model();
        let log: Log = Arc::default();
        let mut chain = GroupJoinInclude::new(step(&model, "a", &log));
        assert!(chain.include(None).is_err());
    }
}
