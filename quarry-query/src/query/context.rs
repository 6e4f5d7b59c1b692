//! Per-execution state shared by the enumerator, the include chains and loaders.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use smol_str::SmolStr;
use tracing::trace;

use crate::diagnostics::Diagnostics;
use crate::executor::CommandExecutor;
use crate::metadata::Model;
use crate::tracking::{QueryBuffer, UnitOfWork};
use crate::value::{Row, Value};

/// Live state of one query execution.
pub struct QueryContext {
    model: Arc<Model>,
    executor: Arc<dyn CommandExecutor>,
    unit_of_work: Arc<UnitOfWork>,
    buffer: QueryBuffer,
    parameters: HashMap<SmolStr, Value>,
    diagnostics: Arc<Diagnostics>,
    include_scopes: AtomicUsize,
    current_group: RwLock<Arc<Vec<Row>>>,
}

impl QueryContext {
    /// Create a context for one execution.
    pub fn new(model: Arc<Model>, executor: Arc<dyn CommandExecutor>, unit_of_work: Arc<UnitOfWork>) -> Self {
        Self {
            model,
            executor,
            unit_of_work,
            buffer: QueryBuffer::new(),
            parameters: HashMap::new(),
            diagnostics: Arc::new(Diagnostics::default()),
            include_scopes: AtomicUsize::new(0),
            current_group: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Set the parameter values of this execution.
    pub fn with_parameters(mut self, parameters: HashMap<SmolStr, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set a single parameter value.
    pub fn with_parameter(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Use a diagnostics policy and sink.
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The metadata model.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The command executor.
    pub fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.executor
    }

    /// The identity map.
    pub fn unit_of_work(&self) -> &Arc<UnitOfWork> {
        &self.unit_of_work
    }

    /// The query buffer.
    pub fn buffer(&self) -> &QueryBuffer {
        &self.buffer
    }

    /// Parameter values.
    pub fn parameters(&self) -> &HashMap<SmolStr, Value> {
        &self.parameters
    }

    /// A parameter value.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Diagnostics policy and sink.
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Open an include scope.
    pub fn begin_include_scope(&self) {
        let depth = self.include_scopes.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(depth, "include scope opened");
    }

    /// Close an include scope. Closing the last one releases untracked instances.
    pub fn end_include_scope(&self) {
        let previous = self
            .include_scopes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| depth.checked_sub(1))
            .unwrap_or(0);
        trace!(depth = previous.saturating_sub(1), "include scope closed");
        if previous <= 1 {
            self.buffer.clear_scope();
        }
    }

    /// Number of open include scopes.
    pub fn include_scope_depth(&self) -> usize {
        self.include_scopes.load(Ordering::Acquire)
    }

    /// Publish the rows of the result element being materialized.
    pub fn set_current_group(&self, rows: Vec<Row>) {
        *self.current_group.write() = Arc::new(rows);
    }

    /// Rows of the result element being materialized.
    pub fn current_group(&self) -> Arc<Vec<Row>> {
        self.current_group.read().clone()
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("parameters", &self.parameters)
            .field("include_scopes", &self.include_scope_depth())
            .field("tracked", &self.unit_of_work.len())
            .finish_non_exhaustive()
    }
}
