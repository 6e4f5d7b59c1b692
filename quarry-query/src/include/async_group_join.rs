//! The asynchronous include chain.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::loader::{AsyncLoaderFactory, AsyncRelatedEntitiesLoader};
use crate::error::{QueryError, QueryResult};
use crate::metadata::NavigationId;
use crate::query::QueryContext;
use crate::tracking::EntityRef;

/// One include path plus the factories of its async loaders.
#[derive(Clone)]
pub struct AsyncIncludeStep {
    /// Navigations from the included source, outermost first.
    pub path: Vec<NavigationId>,
    /// One factory per navigation in `path`.
    pub factories: Vec<AsyncLoaderFactory>,
    /// Whether included entities are tracked.
    pub requires_tracking: bool,
}

impl AsyncIncludeStep {
    /// Create a step.
    pub fn new(path: Vec<NavigationId>, factories: Vec<AsyncLoaderFactory>, requires_tracking: bool) -> Self {
        Self {
            path,
            factories,
            requires_tracking,
        }
    }
}

impl fmt::Debug for AsyncIncludeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncIncludeStep")
            .field("path", &self.path)
            .field("factories", &self.factories.len())
            .field("requires_tracking", &self.requires_tracking)
            .finish()
    }
}

/// Async counterpart of [`GroupJoinInclude`](super::GroupJoinInclude).
///
/// Loads suspend only inside loaders; disposal is synchronous so it also
/// runs from `Drop` when a future is abandoned.
#[derive(Default)]
pub struct AsyncGroupJoinInclude {
    steps: VecDeque<AsyncIncludeStep>,
    loaders: Vec<Vec<Box<dyn AsyncRelatedEntitiesLoader>>>,
    context: Option<Arc<QueryContext>>,
}

impl AsyncGroupJoinInclude {
    /// A chain with a single step.
    pub fn new(step: AsyncIncludeStep) -> Self {
        let mut chain = Self::default();
        chain.push(step);
        chain
    }

    /// Append a step after the existing ones.
    pub fn push(&mut self, step: AsyncIncludeStep) {
        self.steps.push_back(step);
    }

    /// Run the steps of `previous` before the steps of this chain.
    pub fn set_previous(&mut self, mut previous: AsyncGroupJoinInclude) -> QueryResult<()> {
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

        debug!(steps = self.steps.len(), "async include chain initialized");
        Ok(())
    }

    /// Attach every step's navigations to `entity`, oldest step first.
    pub async fn include_async(
        &mut self,
        entity: Option<EntityRef>,
        cancel: &CancellationToken,
    ) -> QueryResult<()> {
        let context = self
            .context
            .clone()
            .ok_or_else(|| QueryError::invalid_state("Include chain used before initialization"))?;

        for (step, loaders) in self.steps.iter().zip(self.loaders.iter_mut()) {
            if cancel.is_cancelled() {
                return Err(QueryError::cancelled());
            }
            context
                .buffer()
                .include_async(
                    &context,
                    entity.clone(),
                    &step.path,
                    loaders,
                    step.requires_tracking,
                    cancel,
                )
                .await?;
        }
        Ok(())
    }

    /// Dispose every loader and close the include scopes, oldest step first.
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
        debug!(steps = self.steps.len(), "async include chain disposed");
    }
}

impl Drop for AsyncGroupJoinInclude {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for AsyncGroupJoinInclude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncGroupJoinInclude")
            .field("steps", &self.steps)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
