//! Enumeration of compiled queries.
//!
//! Rows flow through three stages: a [`RowGrouper`] collects the rows of one
//! result element when a query fans out (group joins, pre-joined includes),
//! the [`ClientPipeline`] runs in-process operators, and the shaper builds
//! the [`QueryItem`]. Include chains run for every materialized entity of
//! the source they were requested on.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{ClientEvaluator, ClientPipeline, Element, RowGrouper};
use super::compiler::CompiledQuery;
use super::context::QueryContext;
use super::shaper::QueryItem;
use crate::error::{QueryError, QueryResult};
use crate::executor::{RowIter, RowStream};
use crate::include::{AsyncGroupJoinInclude, GroupJoinInclude};
use crate::tracking::EntityRef;
use crate::value::Row;

/// State shared by the sync and async enumerators.
struct Pipeline {
    evaluator: ClientEvaluator,
    grouper: Option<RowGrouper>,
    client: ClientPipeline,
    pending: VecDeque<Element>,
    input_done: bool,
    yielded: usize,
}

impl Pipeline {
    fn new(compiled: &CompiledQuery) -> Self {
        let keys = compiled.grouping_key_indices();
        Self {
            evaluator: compiled.evaluator(),
            grouper: (!keys.is_empty()).then(|| RowGrouper::new(keys.to_vec())),
            client: ClientPipeline::new(compiled.client_operators()),
            pending: VecDeque::new(),
            input_done: false,
            yielded: 0,
        }
    }

    /// Whether nothing more needs to be read.
    fn is_drained(&self) -> bool {
        self.input_done || self.client.is_exhausted()
    }

    fn push_row(&mut self, context: &QueryContext, row: Row) -> QueryResult<()> {
        let element = match &mut self.grouper {
            Some(grouper) => match grouper.push(row) {
                Some(element) => element,
                None => return Ok(()),
            },
            None => vec![row],
        };
        self.push_element(context, element)
    }

    fn push_element(&mut self, context: &QueryContext, element: Element) -> QueryResult<()> {
        let passed = self.client.push(&self.evaluator, context.parameters(), element)?;
        self.pending.extend(passed);
        Ok(())
    }

    fn end_of_input(&mut self, context: &QueryContext) -> QueryResult<()> {
        self.input_done = true;
        if let Some(element) = self.grouper.as_mut().and_then(RowGrouper::finish) {
            self.push_element(context, element)?;
        }
        let flushed = self.client.finish(&self.evaluator, context.parameters())?;
        self.pending.extend(flushed);
        Ok(())
    }

    /// Shape an element; returns the item and the entities that need includes.
    fn shape(
        &mut self,
        context: &QueryContext,
        compiled: &CompiledQuery,
        element: Element,
    ) -> QueryResult<(QueryItem, Vec<(SmolStr, EntityRef)>)> {
        let layout = compiled.layout();
        let mut materialized = Vec::new();
        let item = compiled
            .shaper()
            .shape(context, layout, &self.evaluator, &element, &mut materialized)?;
        context.set_current_group(element);
        self.yielded += 1;

        let targets = materialized
            .into_iter()
            .filter_map(|(slot, entity)| layout.slot(slot).map(|s| (s.alias.clone(), entity)))
            .collect();
        Ok((item, targets))
    }
}

/// Synchronous enumerator over a compiled query.
///
/// The command executes on the first call to `next`. Include chains are
/// disposed once the results are exhausted, fail, or are dropped.
pub struct QueryResults {
    context: Arc<QueryContext>,
    compiled: Arc<CompiledQuery>,
    pipeline: Pipeline,
    rows: Option<RowIter>,
    chains: Vec<(SmolStr, GroupJoinInclude)>,
    finished: bool,
}

impl QueryResults {
    /// Prepare an enumeration; nothing executes yet.
    pub fn new(context: Arc<QueryContext>, compiled: Arc<CompiledQuery>) -> QueryResult<Self> {
        let chains = compiled.include_chains()?;
        Ok(Self {
            pipeline: Pipeline::new(&compiled),
            context,
            compiled,
            rows: None,
            chains,
            finished: false,
        })
    }

    /// The execution context.
    pub fn context(&self) -> &Arc<QueryContext> {
        &self.context
    }

    /// Collect every remaining item.
    pub fn to_list(self) -> QueryResult<Vec<QueryItem>> {
        self.collect()
    }

    fn start(&mut self) -> QueryResult<()> {
        let command = self.compiled.command().bind(self.context.parameters())?;
        debug!(sql = %command.sql, parameters = command.parameters.len(), "executing query");
        let rows = self.context.executor().execute(&command)?;
        for (_, chain) in &mut self.chains {
            chain.initialize(self.context.clone())?;
        }
        self.rows = Some(rows);
        Ok(())
    }

    fn advance(&mut self) -> QueryResult<Option<QueryItem>> {
        loop {
            if let Some(element) = self.pipeline.pending.pop_front() {
                return self.materialize(element).map(Some);
            }
            if self.pipeline.is_drained() {
                return Ok(None);
            }
            if self.rows.is_none() {
                self.start()?;
            }
            let next = self.rows.as_mut().and_then(Iterator::next);
            match next {
                Some(row) => self.pipeline.push_row(&self.context, row?)?,
                None => self.pipeline.end_of_input(&self.context)?,
            }
        }
    }

    fn materialize(&mut self, element: Element) -> QueryResult<QueryItem> {
        let (item, targets) = self.pipeline.shape(&self.context, &self.compiled, element)?;
        for (alias, entity) in &targets {
            for (chain_alias, chain) in &mut self.chains {
                if *chain_alias == *alias {
                    chain.include(Some(entity))?;
                }
            }
        }
        Ok(item)
    }

    /// Dispose the include chains and release the reader.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.rows = None;
        for (_, chain) in &mut self.chains {
            chain.dispose();
        }
        crate::quarry_trace!(yielded = self.pipeline.yielded, "query results finished");
    }
}

impl Iterator for QueryResults {
    type Item = QueryResult<QueryItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl Drop for QueryResults {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for QueryResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResults")
            .field("sql", &self.compiled.sql())
            .field("started", &self.rows.is_some())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Asynchronous enumerator over a compiled query.
///
/// Every await point observes the cancellation token; a cancelled
/// enumeration fails with [`ErrorCode::Cancelled`](crate::error::ErrorCode::Cancelled).
pub struct AsyncQueryResults {
    context: Arc<QueryContext>,
    compiled: Arc<CompiledQuery>,
    pipeline: Pipeline,
    stream: Option<RowStream>,
    chains: Vec<(SmolStr, AsyncGroupJoinInclude)>,
    cancel: CancellationToken,
    finished: bool,
}

impl AsyncQueryResults {
    /// Prepare an enumeration; nothing executes yet.
    pub fn new(
        context: Arc<QueryContext>,
        compiled: Arc<CompiledQuery>,
        cancel: CancellationToken,
    ) -> QueryResult<Self> {
        let chains = compiled.async_include_chains()?;
        Ok(Self {
            pipeline: Pipeline::new(&compiled),
            context,
            compiled,
            stream: None,
            chains,
            cancel,
            finished: false,
        })
    }

    /// The execution context.
    pub fn context(&self) -> &Arc<QueryContext> {
        &self.context
    }

    /// The next item, `None` at the end.
    pub async fn next(&mut self) -> QueryResult<Option<QueryItem>> {
        if self.finished {
            return Ok(None);
        }
        let result = self.advance().await;
        if !matches!(result, Ok(Some(_))) {
            self.finish();
        }
        result
    }

    /// Collect every remaining item.
    pub async fn to_list(mut self) -> QueryResult<Vec<QueryItem>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = QueryResult<QueryItem>> {
        futures::stream::try_unfold(self, |mut results| async move {
            Ok(results.next().await?.map(|item| (item, results)))
        })
    }

    async fn start(&mut self) -> QueryResult<()> {
        let command = self.compiled.command().bind(self.context.parameters())?;
        debug!(sql = %command.sql, parameters = command.parameters.len(), "executing query");
        let executor = self.context.executor().clone();
        let cancel = self.cancel.clone();
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QueryError::cancelled()),
            stream = executor.execute_async(&command, &cancel) => stream?,
        };
        for (_, chain) in &mut self.chains {
            chain.initialize(self.context.clone())?;
        }
        self.stream = Some(stream);
        Ok(())
    }

    async fn advance(&mut self) -> QueryResult<Option<QueryItem>> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(QueryError::cancelled());
            }
            if let Some(element) = self.pipeline.pending.pop_front() {
                return self.materialize(element).await.map(Some);
            }
            if self.pipeline.is_drained() {
                return Ok(None);
            }
            if self.stream.is_none() {
                self.start().await?;
            }
            let cancel = self.cancel.clone();
            let next = match self.stream.as_mut() {
                Some(stream) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(QueryError::cancelled()),
                    row = stream.next() => row,
                },
                None => None,
            };
            match next {
                Some(row) => self.pipeline.push_row(&self.context, row?)?,
                None => self.pipeline.end_of_input(&self.context)?,
            }
        }
    }

    async fn materialize(&mut self, element: Element) -> QueryResult<QueryItem> {
        let (item, targets) = self.pipeline.shape(&self.context, &self.compiled, element)?;
        for (alias, entity) in targets {
            for (chain_alias, chain) in &mut self.chains {
                if *chain_alias == alias {
                    chain.include_async(Some(entity.clone()), &self.cancel).await?;
                }
            }
        }
        Ok(item)
    }

    /// Dispose the include chains and release the reader.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.stream = None;
        for (_, chain) in &mut self.chains {
            chain.dispose();
        }
        crate::quarry_trace!(yielded = self.pipeline.yielded, "async query results finished");
    }
}

impl Drop for AsyncQueryResults {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for AsyncQueryResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueryResults")
            .field("sql", &self.compiled.sql())
            .field("started", &self.stream.is_some())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
