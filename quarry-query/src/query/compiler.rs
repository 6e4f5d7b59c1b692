//! Compilation of query operator trees into relational commands.
//!
//! The compiler walks a [`QueryExpression`] bottom-up, resolving member
//! references against the metadata model and translating scalar expressions
//! through the [`CompositeMethodCallTranslator`]. Whatever the store cannot
//! evaluate is kept as a [`ClientOperator`] and run in process after the
//! rows are fetched, subject to the configured
//! [`ClientEvaluationBehavior`]:
//!
//! - `Throw` fails compilation before any command exists.
//! - `Warn` raises a [`EventId::ClientEvaluation`] diagnostic and defers.
//! - `Silent` defers without a diagnostic.
//!
//! Once an operator runs in process, every later filter, ordering and
//! pagination does too.

use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;
use tracing::{debug, info, trace};

use super::client::{ClientEvaluator, ClientMethodRegistry, ClientOperator};
use super::generator::SqlGenerator;
use super::options::QueryOptions;
use super::select::{JoinKind, OrderingExpression, ProjectionColumn, SelectExpression, TableExpression};
use super::shaper::{RowLayout, ScalarSource, Shaper, ShaperNode};
use super::tracking_info::{DefaultEntityTrackingInfoFactory, EntityTrackingInfo, EntityTrackingInfoFactory};
use crate::diagnostics::{DiagnosticEvent, Diagnostics, EventId, TracingSink};
use crate::error::{QueryError, QueryResult};
use crate::expression::{BinaryOp, Expression, MethodCallExpression, Projection, QueryExpression};
use crate::include::{
    AsyncGroupJoinInclude, AsyncIncludeStep, CorrelatedCommand, GroupJoinInclude, IncludeStep, LoaderPlan,
    PreJoinedSlice,
};
use crate::metadata::{EntityType, Model, Navigation, NavigationId};
use crate::sql::{DatabaseType, RelationalCommand};
use crate::translators::CompositeMethodCallTranslator;
use crate::types::{ClientEvaluationBehavior, IncludeStrategy, SortOrder, TrackingBehavior};

/// Eager loading of one navigation path from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludePlan {
    /// Source alias the path starts from.
    pub alias: SmolStr,
    /// Navigations, outermost first.
    pub path: Vec<NavigationId>,
    /// Navigation names, outermost first.
    pub names: Vec<SmolStr>,
    /// One loader per navigation.
    pub loaders: Vec<LoaderPlan>,
    /// Whether loaded entities are tracked.
    pub requires_tracking: bool,
}

/// Everything needed to execute and materialize one query.
pub struct CompiledQuery {
    model: Arc<Model>,
    methods: Arc<ClientMethodRegistry>,
    select: SelectExpression,
    command: RelationalCommand,
    layout: Arc<RowLayout>,
    shaper: Shaper,
    client_operators: Vec<ClientOperator>,
    tracking: Vec<EntityTrackingInfo>,
    includes: Vec<IncludePlan>,
    grouping_key_indices: Vec<usize>,
    database: DatabaseType,
}

impl CompiledQuery {
    /// The metadata model.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The command tree.
    pub fn select(&self) -> &SelectExpression {
        &self.select
    }

    /// The generated command.
    pub fn command(&self) -> &RelationalCommand {
        &self.command
    }

    /// SQL text of the command.
    pub fn sql(&self) -> &str {
        &self.command.sql
    }

    /// Target dialect.
    pub fn database(&self) -> DatabaseType {
        self.database
    }

    /// Column layout of fetched rows.
    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    /// Result shaper.
    pub fn shaper(&self) -> &Shaper {
        &self.shaper
    }

    /// Operators evaluated in process, in query order.
    pub fn client_operators(&self) -> &[ClientOperator] {
        &self.client_operators
    }

    /// Whether anything is evaluated in process.
    pub fn has_client_evaluation(&self) -> bool {
        !self.client_operators.is_empty()
            || matches_client(self.shaper.root())
    }

    /// Tracking manifest, one entry per source.
    pub fn tracking_infos(&self) -> &[EntityTrackingInfo] {
        &self.tracking
    }

    /// Include paths kept after projection.
    pub fn includes(&self) -> &[IncludePlan] {
        &self.includes
    }

    /// Columns whose values identify one result element; empty when every
    /// row is an element.
    pub fn grouping_key_indices(&self) -> &[usize] {
        &self.grouping_key_indices
    }

    /// An evaluator for client expressions over this query's rows.
    pub fn evaluator(&self) -> ClientEvaluator {
        ClientEvaluator::new(self.model.clone(), self.layout.clone(), self.methods.clone())
    }

    /// One include chain per source alias, include paths in query order.
    pub fn include_chains(&self) -> QueryResult<Vec<(SmolStr, GroupJoinInclude)>> {
        let mut chains: Vec<(SmolStr, GroupJoinInclude)> = Vec::new();
        for plan in &self.includes {
            let factories = plan.loaders.iter().map(LoaderPlan::factory).collect();
            let mut chain = GroupJoinInclude::new(IncludeStep::new(
                plan.path.clone(),
                factories,
                plan.requires_tracking,
            ));
            match chains.iter().position(|(alias, _)| *alias == plan.alias) {
                Some(index) => {
                    let (alias, previous) = chains.remove(index);
                    chain.set_previous(previous)?;
                    chains.insert(index, (alias, chain));
                }
                None => chains.push((plan.alias.clone(), chain)),
            }
        }
        Ok(chains)
    }

    /// Asynchronous [`include_chains`](Self::include_chains).
    pub fn async_include_chains(&self) -> QueryResult<Vec<(SmolStr, AsyncGroupJoinInclude)>> {
        let mut chains: Vec<(SmolStr, AsyncGroupJoinInclude)> = Vec::new();
        for plan in &self.includes {
            let factories = plan.loaders.iter().map(LoaderPlan::async_factory).collect();
            let mut chain = AsyncGroupJoinInclude::new(AsyncIncludeStep::new(
                plan.path.clone(),
                factories,
                plan.requires_tracking,
            ));
            match chains.iter().position(|(alias, _)| *alias == plan.alias) {
                Some(index) => {
                    let (alias, previous) = chains.remove(index);
                    chain.set_previous(previous)?;
                    chains.insert(index, (alias, chain));
                }
                None => chains.push((plan.alias.clone(), chain)),
            }
        }
        Ok(chains)
    }
}

fn matches_client(node: &ShaperNode) -> bool {
    match node {
        ShaperNode::Scalar(ScalarSource::Client(_)) => true,
        ShaperNode::Record(fields) => fields.iter().any(|(_, field)| matches_client(field)),
        _ => false,
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("sql", &self.command.sql)
            .field("client_operators", &self.client_operators)
            .field("includes", &self.includes)
            .field("tracking", &self.tracking)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceRole {
    Root,
    Joined,
    GroupJoinInner,
}

#[derive(Debug, Clone)]
struct QuerySource {
    alias: SmolStr,
    entity_type: SmolStr,
    role: SourceRole,
}

#[derive(Debug, Clone)]
struct IncludeRequest {
    alias: SmolStr,
    navigations: Vec<NavigationId>,
    names: Vec<SmolStr>,
}

/// A projection whose scalars have been assigned to the store or the client.
#[derive(Debug, Clone)]
enum PlannedShape {
    Entity(SmolStr),
    Server(usize),
    Client(Expression),
    Record(Vec<(SmolStr, PlannedShape)>),
    Grouping { outer: SmolStr, inner: SmolStr },
}

impl PlannedShape {
    fn materializes(&self, alias: &str) -> bool {
        match self {
            Self::Entity(a) => a == alias,
            Self::Server(_) | Self::Client(_) => false,
            Self::Record(fields) => fields.iter().any(|(_, f)| f.materializes(alias)),
            Self::Grouping { outer, inner } => outer == alias || inner == alias,
        }
    }
}

#[derive(Debug, Clone)]
struct OrderRun {
    keys: Vec<(Expression, SortOrder)>,
    client: bool,
}

#[derive(Debug)]
struct State {
    select: SelectExpression,
    sources: Vec<QuerySource>,
    client: Vec<ClientOperator>,
    deferred: bool,
    order_run: Option<OrderRun>,
    element_orderings: Vec<OrderingExpression>,
    shape: Option<PlannedShape>,
    computed: Vec<Expression>,
    includes: Vec<IncludeRequest>,
    tracking: Option<TrackingBehavior>,
    group_join: Option<(SmolStr, SmolStr)>,
}

impl State {
    fn new(select: SelectExpression, source: QuerySource) -> Self {
        Self {
            select,
            sources: vec![source],
            client: Vec::new(),
            deferred: false,
            order_run: None,
            element_orderings: Vec::new(),
            shape: None,
            computed: Vec::new(),
            includes: Vec::new(),
            tracking: None,
            group_join: None,
        }
    }

    fn source(&self, alias: &str) -> Option<&QuerySource> {
        self.sources.iter().find(|s| s.alias == alias)
    }

    fn root(&self) -> &QuerySource {
        &self.sources[0]
    }

    /// Whether later operators must run in process.
    fn client_only(&self) -> bool {
        self.deferred || self.select.is_paginated()
    }

    fn ensure_unprojected(&self, operator: &str) -> QueryResult<()> {
        if self.shape.is_some() {
            return Err(QueryError::invalid_query_shape(format!(
                "A {} cannot follow a select",
                operator
            )));
        }
        Ok(())
    }
}

struct PreJoin {
    parent: SmolStr,
    navigation: NavigationId,
    alias: SmolStr,
    slice: Arc<PreJoinedSlice>,
}

/// Compiles [`QueryExpression`]s for one model and option set.
#[derive(Clone)]
pub struct QueryCompiler {
    model: Arc<Model>,
    translator: Arc<CompositeMethodCallTranslator>,
    methods: Arc<ClientMethodRegistry>,
    options: QueryOptions,
    diagnostics: Arc<Diagnostics>,
    tracking_factory: Arc<dyn EntityTrackingInfoFactory>,
}

impl QueryCompiler {
    /// A compiler with the relational translator set and the default client methods.
    pub fn new(model: Arc<Model>, options: QueryOptions) -> Self {
        let diagnostics = Arc::new(Diagnostics::new(options.warnings.clone(), Arc::new(TracingSink)));
        Self {
            model,
            translator: Arc::new(CompositeMethodCallTranslator::relational()),
            methods: Arc::new(ClientMethodRegistry::with_defaults()),
            options,
            diagnostics,
            tracking_factory: Arc::new(DefaultEntityTrackingInfoFactory),
        }
    }

    /// Use a translator composite.
    pub fn with_translator(mut self, translator: Arc<CompositeMethodCallTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Use a client method registry.
    pub fn with_methods(mut self, methods: Arc<ClientMethodRegistry>) -> Self {
        self.methods = methods;
        self
    }

    /// Raise diagnostics through these diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Use a tracking info factory.
    pub fn with_tracking_info_factory(mut self, factory: Arc<dyn EntityTrackingInfoFactory>) -> Self {
        self.tracking_factory = factory;
        self
    }

    /// The options in effect.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Compile a query.
    pub fn compile(&self, query: &QueryExpression) -> QueryResult<CompiledQuery> {
        let state = self.visit(query)?;
        self.finalize(state)
    }

    fn visit(&self, expression: &QueryExpression) -> QueryResult<State> {
        trace!(operator = expression.operator_name(), "visiting");
        let mut state = self.visit_operator(expression)?;
        if !matches!(
            expression,
            QueryExpression::OrderBy { .. }
                | QueryExpression::Include { .. }
                | QueryExpression::AsNoTracking(_)
                | QueryExpression::AsTracking(_)
        ) {
            state.order_run = None;
        }
        Ok(state)
    }

    fn visit_operator(&self, expression: &QueryExpression) -> QueryResult<State> {
        match expression {
            QueryExpression::Source { entity_type, alias } => {
                let entity_type = self.model.require_entity_type(entity_type)?;
                let table = entity_type
                    .table()
                    .ok_or_else(|| QueryError::entity_type_not_found(entity_type.name()))?;
                Ok(State::new(
                    SelectExpression::new(alias.clone(), table, entity_type.name()),
                    QuerySource {
                        alias: alias.clone(),
                        entity_type: entity_type.name().into(),
                        role: SourceRole::Root,
                    },
                ))
            }
            QueryExpression::Filter { source, predicate } => {
                let mut state = self.visit(source)?;
                state.ensure_unprojected("filter")?;
                check_group_scope(&state, predicate, "filter")?;

                let client_only = state.client_only();
                let mut deferred = Vec::new();
                for conjunct in predicate.clone().into_conjuncts() {
                    match self.translate(&state, &conjunct)? {
                        Some(translated) if !client_only => state.select.add_predicate(translated),
                        _ => deferred.push(conjunct),
                    }
                }
                if let Some(client) = Expression::conjunction(deferred) {
                    self.client_evaluation(&client)?;
                    state.client.push(ClientOperator::Filter(client));
                    state.deferred = true;
                }
                Ok(state)
            }
            QueryExpression::OrderBy { source, key, order } => {
                let mut state = self.visit(source)?;
                let run = state.order_run.take();
                state.ensure_unprojected("order by")?;
                check_group_scope(&state, key, "order by")?;

                let mut keys = run.as_ref().map(|r| r.keys.clone()).unwrap_or_default();
                keys.push((key.clone(), *order));

                let translated = self.translate(&state, key)?;
                let server_run = run.as_ref().is_none_or(|r| !r.client);
                match translated {
                    Some(translated) if !state.client_only() && server_run => {
                        if run.is_none() {
                            state.select.orderings.clear();
                        }
                        state.select.add_ordering(translated, *order);
                        state.order_run = Some(OrderRun { keys, client: false });
                    }
                    _ => {
                        self.client_evaluation(key)?;
                        match (&run, state.client.last_mut()) {
                            (Some(r), Some(ClientOperator::OrderBy(existing))) if r.client => {
                                *existing = keys.clone();
                            }
                            _ => {
                                if run.is_some() {
                                    state.select.orderings.clear();
                                }
                                state.client.push(ClientOperator::OrderBy(keys.clone()));
                            }
                        }
                        state.deferred = true;
                        state.order_run = Some(OrderRun { keys, client: true });
                    }
                }
                Ok(state)
            }
            QueryExpression::Paginate { source, skip, take } => {
                let mut state = self.visit(source)?;
                if state.deferred {
                    if let Some(skip) = skip {
                        state.client.push(ClientOperator::Skip(*skip));
                    }
                    if let Some(take) = take {
                        state.client.push(ClientOperator::Take(*take));
                    }
                } else {
                    state.select.paginate(*skip, *take);
                }
                Ok(state)
            }
            QueryExpression::Select { source, projection } => {
                let mut state = self.visit(source)?;
                state.ensure_unprojected("select")?;
                if state.group_join.is_some() {
                    return Err(QueryError::invalid_query_shape(
                        "A group join result cannot be projected",
                    ));
                }
                let shape = self.plan_projection(&mut state, projection)?;
                state.shape = Some(shape);
                Ok(state)
            }
            QueryExpression::Join {
                outer,
                inner,
                outer_key,
                inner_key,
            } => self.visit_join(outer, inner, outer_key, inner_key, false),
            QueryExpression::GroupJoin {
                outer,
                inner,
                outer_key,
                inner_key,
            } => self.visit_join(outer, inner, outer_key, inner_key, true),
            QueryExpression::Include { source, path } => {
                let mut state = self.visit(source)?;
                let request = self.resolve_include(state.root(), path)?;
                let duplicate = state
                    .includes
                    .iter()
                    .any(|r| r.alias == request.alias && r.navigations == request.navigations);
                if !duplicate {
                    state.includes.push(request);
                }
                Ok(state)
            }
            QueryExpression::AsNoTracking(source) => {
                let mut state = self.visit(source)?;
                state.tracking = Some(TrackingBehavior::NoTracking);
                Ok(state)
            }
            QueryExpression::AsTracking(source) => {
                let mut state = self.visit(source)?;
                state.tracking = Some(TrackingBehavior::TrackAll);
                Ok(state)
            }
        }
    }

    fn visit_join(
        &self,
        outer: &QueryExpression,
        inner: &QueryExpression,
        outer_key: &Expression,
        inner_key: &Expression,
        group: bool,
    ) -> QueryResult<State> {
        let operator = if group { "group join" } else { "join" };
        let mut state = self.visit(outer)?;
        let inner_state = self.visit(inner)?;

        state.ensure_unprojected(operator)?;
        if state.group_join.is_some() {
            return Err(QueryError::invalid_query_shape(format!(
                "A {} cannot follow a group join",
                operator
            )));
        }
        if state.client_only() {
            return Err(QueryError::invalid_query_shape(format!(
                "A {} cannot follow pagination or in-process evaluation",
                operator
            )));
        }
        if group && state.sources.len() != 1 {
            return Err(QueryError::invalid_query_shape(
                "The outer side of a group join must be a single source",
            ));
        }
        if inner_state.sources.len() != 1
            || inner_state.shape.is_some()
            || inner_state.client_only()
        {
            return Err(QueryError::invalid_query_shape(format!(
                "The inner side of a {} must be a filtered or ordered source",
                operator
            )));
        }

        let inner_source = inner_state.root().clone();
        if state.source(&inner_source.alias).is_some() {
            return Err(QueryError::invalid_query_shape(format!(
                "Alias '{}' is used by more than one source",
                inner_source.alias
            )));
        }

        let outer_sql = self
            .translate(&state, outer_key)?
            .ok_or_else(|| untranslatable_key(outer_key))?;
        let inner_sql = self
            .translate(&inner_state, inner_key)?
            .ok_or_else(|| untranslatable_key(inner_key))?;

        let State {
            select: inner_select,
            includes: inner_includes,
            ..
        } = inner_state;
        let mut on = outer_sql.equal(inner_sql);
        if let Some(predicate) = inner_select.predicate {
            on = on.and(predicate);
        }
        let table = inner_select.tables.into_iter().next().ok_or_else(|| {
            QueryError::internal("Inner source has no table")
        })?;

        if group {
            state.select.add_join(table, JoinKind::Left, on);
            state.element_orderings = inner_select.orderings;
            state.group_join = Some((state.root().alias.clone(), inner_source.alias.clone()));
            state.sources.push(QuerySource {
                role: SourceRole::GroupJoinInner,
                ..inner_source
            });
        } else {
            state.select.add_join(table, JoinKind::Inner, on);
            state.select.orderings.extend(inner_select.orderings);
            state.sources.push(QuerySource {
                role: SourceRole::Joined,
                ..inner_source
            });
        }
        state.includes.extend(inner_includes);
        Ok(state)
    }

    fn resolve_include(&self, source: &QuerySource, path: &[SmolStr]) -> QueryResult<IncludeRequest> {
        if path.is_empty() {
            return Err(QueryError::invalid_query_shape("An include path cannot be empty"));
        }
        let mut entity_type = source.entity_type.clone();
        let mut navigations = Vec::with_capacity(path.len());
        for name in path {
            let navigation = self
                .model
                .find_navigation(&entity_type, name)
                .ok_or_else(|| QueryError::navigation_not_found(entity_type.as_str(), name.as_str()))?;
            navigations.push(navigation.id());
            entity_type = navigation.target_type(&self.model).name().into();
        }
        Ok(IncludeRequest {
            alias: source.alias.clone(),
            navigations,
            names: path.to_vec(),
        })
    }

    fn plan_projection(&self, state: &mut State, projection: &Projection) -> QueryResult<PlannedShape> {
        match projection {
            Projection::Entity(alias) => {
                if state.source(alias).is_none() {
                    return Err(QueryError::invalid_query_shape(format!(
                        "The projection references unknown source '{}'",
                        alias
                    )));
                }
                Ok(PlannedShape::Entity(alias.clone()))
            }
            Projection::Scalar(expression) => match self.translate(state, expression)? {
                Some(translated) => {
                    state.computed.push(translated);
                    Ok(PlannedShape::Server(state.computed.len() - 1))
                }
                None => {
                    self.client_evaluation(expression)?;
                    Ok(PlannedShape::Client(expression.clone()))
                }
            },
            Projection::Record(fields) => {
                let mut planned = Vec::with_capacity(fields.len());
                for (name, field) in fields {
                    planned.push((name.clone(), self.plan_projection(state, field)?));
                }
                Ok(PlannedShape::Record(planned))
            }
            Projection::Grouping { .. } => Err(QueryError::invalid_query_shape(
                "Grouping projections are produced by group joins only",
            )),
        }
    }

    /// Translate a scalar expression to its store form, `None` when some part
    /// has no translation. Unknown sources and members are errors.
    fn translate(&self, state: &State, expression: &Expression) -> QueryResult<Option<Expression>> {
        Ok(match expression {
            Expression::Member { source, member } => {
                let query_source = state.source(source).ok_or_else(|| {
                    QueryError::translation(format!("Unknown query source '{}'", source))
                })?;
                let entity_type = self.model.require_entity_type(&query_source.entity_type)?;
                let property = entity_type
                    .property(member)
                    .ok_or_else(|| QueryError::member_not_found(entity_type.name(), member.as_str()))?;
                Some(Expression::column(source.clone(), property.column.clone()))
            }
            Expression::Column { .. } | Expression::Constant(_) | Expression::Parameter(_) => {
                Some(expression.clone())
            }
            Expression::Binary { op, left, right } => {
                let left = self.translate(state, left)?;
                let right = self.translate(state, right)?;
                match (left, right) {
                    (Some(left), Some(right)) => Some(null_comparison(*op, left, right)),
                    _ => None,
                }
            }
            Expression::Not(inner) => self.translate(state, inner)?.map(|e| Expression::Not(Box::new(e))),
            Expression::IsNull(inner) => self
                .translate(state, inner)?
                .map(|e| Expression::IsNull(Box::new(e))),
            Expression::MethodCall(call) => {
                let object = match &call.object {
                    Some(object) => Some(self.translate(state, object)?),
                    None => None,
                };
                let arguments = self.translate_all(state, &call.arguments)?;
                let (object, arguments) = match (object, arguments) {
                    (Some(None), _) | (_, None) => return Ok(None),
                    (object, Some(arguments)) => (object.flatten(), arguments),
                };
                let translated = self.translator.translate(&MethodCallExpression::new(
                    object,
                    call.method.clone(),
                    arguments,
                ))?;
                match translated {
                    Expression::MethodCall(_) => None,
                    Expression::Binary { op, left, right } => Some(null_comparison(op, *left, *right)),
                    other => Some(other),
                }
            }
            Expression::SqlFunction { name, arguments } => self
                .translate_all(state, arguments)?
                .map(|arguments| Expression::function(name.clone(), arguments)),
            Expression::Like {
                operand,
                pattern,
                escape,
            } => match (self.translate(state, operand)?, self.translate(state, pattern)?) {
                (Some(operand), Some(pattern)) => Some(Expression::Like {
                    operand: Box::new(operand),
                    pattern: Box::new(pattern),
                    escape: *escape,
                }),
                _ => None,
            },
        })
    }

    fn translate_all(&self, state: &State, expressions: &[Expression]) -> QueryResult<Option<Vec<Expression>>> {
        let mut translated = Vec::with_capacity(expressions.len());
        let mut complete = true;
        for expression in expressions {
            match self.translate(state, expression)? {
                Some(e) => translated.push(e),
                None => complete = false,
            }
        }
        Ok(complete.then_some(translated))
    }

    /// Apply the client evaluation behavior to an expression about to run in process.
    fn client_evaluation(&self, expression: &Expression) -> QueryResult<()> {
        if self.options.client_evaluation == ClientEvaluationBehavior::Throw {
            return Err(QueryError::client_evaluation_disallowed(expression.to_string()));
        }

        let mut missing = None;
        expression.walk(&mut |node| {
            if let Expression::MethodCall(call) = node {
                if missing.is_none() && !self.methods.contains(&call.method) {
                    missing = Some(call.method.to_string());
                }
            }
        });
        if let Some(method) = missing {
            return Err(QueryError::translation(format!(
                "'{}' cannot be translated and has no in-process implementation",
                method
            ))
            .with_suggestion("Register an implementation with ClientMethodRegistry::register"));
        }

        if self.options.client_evaluation == ClientEvaluationBehavior::Warn {
            self.diagnostics
                .emit(DiagnosticEvent::new(EventId::ClientEvaluation).with("expression", expression))?;
        }
        debug!(expression = %expression, "deferring to in-process evaluation");
        Ok(())
    }

    fn finalize(&self, state: State) -> QueryResult<CompiledQuery> {
        let State {
            mut select,
            sources,
            client: mut client_operators,
            element_orderings,
            shape,
            computed,
            includes,
            tracking,
            group_join,
            ..
        } = state;
        let requires_tracking = tracking.unwrap_or(self.options.tracking) == TrackingBehavior::TrackAll;

        let shape = match shape {
            Some(shape) => shape,
            None => match &group_join {
                Some((outer, inner)) => PlannedShape::Grouping {
                    outer: outer.clone(),
                    inner: inner.clone(),
                },
                None if sources.len() == 1 => PlannedShape::Entity(sources[0].alias.clone()),
                None => PlannedShape::Record(
                    sources
                        .iter()
                        .map(|s| (s.alias.clone(), PlannedShape::Entity(s.alias.clone())))
                        .collect(),
                ),
            },
        };

        let mut kept = Vec::with_capacity(includes.len());
        for request in includes {
            if shape.materializes(&request.alias) {
                kept.push(request);
            } else {
                self.diagnostics.emit(
                    DiagnosticEvent::new(EventId::IncludeIgnored)
                        .with("source", &request.alias)
                        .with("path", request.names.join(".")),
                )?;
            }
        }

        let tracking: Vec<EntityTrackingInfo> = sources
            .iter()
            .map(|source| {
                let paths = kept
                    .iter()
                    .filter(|r| r.alias == source.alias)
                    .map(|r| r.names.clone())
                    .collect();
                self.tracking_factory
                    .create(&source.alias, &source.entity_type, requires_tracking, paths)
            })
            .collect();

        let mut layout = RowLayout::default();
        for (source, info) in sources.iter().zip(&tracking) {
            let entity_type = self.model.require_entity_type(&source.entity_type)?;
            layout.add_entity(
                source.alias.clone(),
                source.entity_type.clone(),
                entity_type.properties().len(),
                info.requires_tracking,
            );
            push_columns(&mut select, &source.alias, entity_type);
        }

        let mut joins = Vec::new();
        let mut include_plans = Vec::with_capacity(kept.len());
        for request in kept {
            let requires_tracking = tracking
                .iter()
                .find(|i| i.alias == request.alias)
                .map_or(requires_tracking, |i| i.requires_tracking);
            let loaders = match self.options.include_strategy {
                IncludeStrategy::Correlated => request
                    .navigations
                    .iter()
                    .map(|id| self.correlated_plan(*id))
                    .collect::<QueryResult<Vec<_>>>()?,
                IncludeStrategy::PreJoined => {
                    self.pre_joined_plans(&request, requires_tracking, &mut select, &mut layout, &mut joins)?
                }
            };
            include_plans.push(IncludePlan {
                alias: request.alias,
                path: request.navigations,
                names: request.names,
                loaders,
                requires_tracking,
            });
        }

        let mut grouping_key_indices = Vec::new();
        if group_join.is_some() || !joins.is_empty() {
            for source in sources.iter().filter(|s| s.role != SourceRole::GroupJoinInner) {
                let indices = layout
                    .key_indices(&self.model, &source.alias)
                    .ok_or_else(|| QueryError::internal(format!("No layout slot for '{}'", source.alias)))?;
                grouping_key_indices.extend(indices);
                self.order_by_key(&mut select, &source.alias, &source.entity_type)?;
            }
            for ordering in element_orderings {
                select.add_ordering(ordering.expression, ordering.order);
            }
            for source in sources.iter().filter(|s| s.role == SourceRole::GroupJoinInner) {
                self.order_by_key(&mut select, &source.alias, &source.entity_type)?;
            }
            for join in &joins {
                self.order_by_key(&mut select, &join.alias, &join.slice.entity_type)?;
            }

            // Row limits would cut groups apart; page over whole elements instead.
            let mut front = Vec::new();
            if let Some(offset) = select.offset.take() {
                front.push(ClientOperator::Skip(offset));
            }
            if let Some(limit) = select.limit.take() {
                front.push(ClientOperator::Take(limit));
            }
            client_operators.splice(0..0, front);
        }

        let computed_base = layout.width();
        for (index, expression) in computed.into_iter().enumerate() {
            layout.add_column();
            select.projection.push(ProjectionColumn {
                expression,
                alias: Some(SmolStr::new(format!("c{}", index))),
            });
        }
        let root = bind_shape(&shape, &layout, computed_base)?;

        let command = SqlGenerator::new(self.options.database).generate(&select)?;
        if self.options.log_queries {
            info!(sql = %command.sql, "compiled query");
        }
        debug!(
            sql = %command.sql,
            parameters = command.parameters.len(),
            client_operators = client_operators.len(),
            includes = include_plans.len(),
            "compiled query"
        );

        Ok(CompiledQuery {
            model: self.model.clone(),
            methods: self.methods.clone(),
            select,
            command,
            layout: Arc::new(layout),
            shaper: Shaper::new(root),
            client_operators,
            tracking,
            includes: include_plans,
            grouping_key_indices,
            database: self.options.database,
        })
    }

    fn order_by_key(&self, select: &mut SelectExpression, alias: &str, entity_type: &str) -> QueryResult<()> {
        let entity_type = self.model.require_entity_type(entity_type)?;
        for property in entity_type.primary_key() {
            select.add_ordering(Expression::column(alias, property.column.clone()), SortOrder::Asc);
        }
        Ok(())
    }

    fn correlated_plan(&self, id: NavigationId) -> QueryResult<LoaderPlan> {
        let navigation = self.model.navigation(id);
        let target = navigation.target_type(&self.model);
        let table = target
            .table()
            .ok_or_else(|| QueryError::entity_type_not_found(target.name()))?;

        let mut select = SelectExpression::new("t", table, target.name());
        push_columns(&mut select, "t", target);
        let mut key_parameters = Vec::new();
        for (index, property) in match_properties(&self.model, navigation).iter().enumerate() {
            let name = SmolStr::new(format!("__key_{}", index));
            select.add_predicate(
                Expression::column("t", column_of(target, property)?).equal(Expression::Parameter(name.clone())),
            );
            key_parameters.push(name);
        }
        self.order_by_key(&mut select, "t", target.name())?;

        let command = SqlGenerator::new(self.options.database).generate(&select)?;
        let label = navigation.display(&self.model);
        debug!(navigation = %label, sql = %command.sql, "compiled include command");
        Ok(LoaderPlan::Correlated(Arc::new(CorrelatedCommand {
            command,
            key_parameters,
            navigation: label.into(),
        })))
    }

    fn pre_joined_plans(
        &self,
        request: &IncludeRequest,
        requires_tracking: bool,
        select: &mut SelectExpression,
        layout: &mut RowLayout,
        joins: &mut Vec<PreJoin>,
    ) -> QueryResult<Vec<LoaderPlan>> {
        let mut parent = request.alias.clone();
        let mut plans = Vec::with_capacity(request.navigations.len());
        for &id in &request.navigations {
            let index = match joins.iter().position(|j| j.parent == parent && j.navigation == id) {
                Some(index) => index,
                None => {
                    let join = self.pre_join(&parent, id, joins.len(), requires_tracking, select, layout)?;
                    joins.push(join);
                    joins.len() - 1
                }
            };
            plans.push(LoaderPlan::PreJoined(joins[index].slice.clone()));
            parent = joins[index].alias.clone();
        }
        Ok(plans)
    }

    fn pre_join(
        &self,
        parent: &SmolStr,
        id: NavigationId,
        ordinal: usize,
        requires_tracking: bool,
        select: &mut SelectExpression,
        layout: &mut RowLayout,
    ) -> QueryResult<PreJoin> {
        let navigation = self.model.navigation(id);
        let declaring = navigation.declaring_entity_type(&self.model);
        let target = navigation.target_type(&self.model);
        let table = target
            .table()
            .ok_or_else(|| QueryError::entity_type_not_found(target.name()))?;
        let alias = SmolStr::new(format!("i{}", ordinal));

        let foreign_key = navigation.foreign_key(&self.model);
        let (parent_properties, target_properties) = if navigation.is_dependent_to_principal() {
            (foreign_key.dependent_properties(), foreign_key.principal_key())
        } else {
            (foreign_key.principal_key(), foreign_key.dependent_properties())
        };

        let mut conditions = Vec::with_capacity(parent_properties.len());
        for (parent_property, target_property) in parent_properties.iter().zip(target_properties) {
            conditions.push(
                Expression::column(parent.clone(), column_of(declaring, parent_property)?)
                    .equal(Expression::column(alias.clone(), column_of(target, target_property)?)),
            );
        }
        let on = Expression::conjunction(conditions)
            .ok_or_else(|| QueryError::invalid_model(format!("'{}' has an empty foreign key", navigation.display(&self.model))))?;

        select.add_join(
            TableExpression {
                alias: alias.clone(),
                table: table.into(),
                entity_type: target.name().into(),
                join: None,
            },
            JoinKind::Left,
            on,
        );
        let offset = layout.width();
        layout.add_entity(
            alias.clone(),
            target.name().into(),
            target.properties().len(),
            requires_tracking,
        );
        push_columns(select, &alias, target);

        let match_indices = target_properties
            .iter()
            .map(|p| {
                target
                    .property_index(p)
                    .ok_or_else(|| QueryError::member_not_found(target.name(), p.as_str()))
            })
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(PreJoin {
            parent: parent.clone(),
            navigation: id,
            alias,
            slice: Arc::new(PreJoinedSlice {
                entity_type: target.name().into(),
                offset,
                width: target.properties().len(),
                match_indices,
                key_indices: target.primary_key_indices().to_vec(),
                navigation: navigation.display(&self.model).into(),
            }),
        })
    }
}

impl fmt::Debug for QueryCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCompiler")
            .field("options", &self.options)
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}

fn check_group_scope(state: &State, expression: &Expression, operator: &str) -> QueryResult<()> {
    if let Some((outer, inner)) = &state.group_join {
        if expression.members().iter().any(|(source, _)| source == inner) {
            return Err(QueryError::invalid_query_shape(format!(
                "A {} after a group join may only reference '{}'",
                operator, outer
            )));
        }
    }
    Ok(())
}

fn untranslatable_key(key: &Expression) -> QueryError {
    QueryError::translation(format!("The join key '{}' cannot be translated", key))
        .with_suggestion("Join keys are always evaluated by the store")
}

/// `x = NULL` becomes `x IS NULL`.
fn null_comparison(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    let is_null = |e: &Expression| matches!(e, Expression::Constant(v) if v.is_null());
    let tested = match (is_null(&left), is_null(&right)) {
        (false, true) => Some(left.clone()),
        (true, false) => Some(right.clone()),
        _ => None,
    };
    match (op, tested) {
        (BinaryOp::Equal, Some(tested)) => tested.is_null(),
        (BinaryOp::NotEqual, Some(tested)) => tested.is_null().negate(),
        _ => Expression::binary(op, left, right),
    }
}

fn push_columns(select: &mut SelectExpression, alias: &str, entity_type: &EntityType) {
    for property in entity_type.properties() {
        select.projection.push(ProjectionColumn {
            expression: Expression::column(alias, property.column.clone()),
            alias: None,
        });
    }
}

fn column_of(entity_type: &EntityType, property: &str) -> QueryResult<SmolStr> {
    entity_type
        .property(property)
        .map(|p| p.column.clone())
        .ok_or_else(|| QueryError::member_not_found(entity_type.name(), property))
}

/// Properties of the target compared against the key read from the declaring entity.
fn match_properties<'m>(model: &'m Model, navigation: &Navigation) -> &'m [SmolStr] {
    let foreign_key = navigation.foreign_key(model);
    if navigation.is_dependent_to_principal() {
        foreign_key.principal_key()
    } else {
        foreign_key.dependent_properties()
    }
}

fn bind_shape(shape: &PlannedShape, layout: &RowLayout, computed_base: usize) -> QueryResult<ShaperNode> {
    let slot = |alias: &str| {
        layout
            .slot_of(alias)
            .ok_or_else(|| QueryError::internal(format!("No layout slot for '{}'", alias)))
    };
    Ok(match shape {
        PlannedShape::Entity(alias) => ShaperNode::Entity(slot(alias)?),
        PlannedShape::Server(index) => ShaperNode::Scalar(ScalarSource::Column(computed_base + index)),
        PlannedShape::Client(expression) => ShaperNode::Scalar(ScalarSource::Client(expression.clone())),
        PlannedShape::Record(fields) => ShaperNode::Record(
            fields
                .iter()
                .map(|(name, field)| Ok((name.clone(), bind_shape(field, layout, computed_base)?)))
                .collect::<QueryResult<Vec<_>>>()?,
        ),
        PlannedShape::Grouping { outer, inner } => ShaperNode::Grouping {
            outer: slot(outer)?,
            inner: slot(inner)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{MemorySink, WarningsConfigurationBuilder};
    use crate::error::ErrorCode;
    use crate::expression::Query;
    use crate::test_support::order_model;
    use pretty_assertions::assert_eq;

    fn compiler(options: QueryOptions) -> (QueryCompiler, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let diagnostics = Arc::new(Diagnostics::new(options.warnings.clone(), sink.clone()));
        (
            QueryCompiler::new(order_model(), options).with_diagnostics(diagnostics),
            sink,
        )
    }

    fn reversed_customer() -> Expression {
        Expression::member("o", "Customer")
            .call("string", "reverse", vec![])
            .equal("cba")
    }

    #[test]
    fn test_compile_filter_order_take() {
        let (compiler, _) = compiler(QueryOptions::new());
        let query = Query::from("Order", "o")
            .filter(Expression::member("o", "Customer").equal("ada"))
            .order_by(Expression::member("o", "Id"))
            .take(10)
            .build();

        let compiled = compiler.compile(&query).unwrap();
        assert_eq!(
            compiled.sql(),
            r#"SELECT "o"."id", "o"."customer" FROM "orders" AS "o" WHERE ("o"."customer" = ?) ORDER BY "o"."id" ASC LIMIT 10"#
        );
        assert!(compiled.client_operators().is_empty());
        assert_eq!(compiled.shaper().root(), &ShaperNode::Entity(0));
    }

    #[test]
    fn test_null_comparison_becomes_is_null() {
        let (compiler, _) = compiler(QueryOptions::new());
        let query = Query::from("Order", "o")
            .filter(Expression::member("o", "Customer").not_equal(Expression::Constant(crate::value::Value::Null)))
            .build();
        let compiled = compiler.compile(&query).unwrap();
        assert!(compiled.sql().ends_with(r#"WHERE NOT (("o"."customer" IS NULL))"#));
    }

    #[test]
    fn test_starts_with_translates_to_like() {
        let (compiler, _) = compiler(QueryOptions::new());
        let query = Query::from("Order", "o")
            .filter(
                Expression::member("o", "Customer").call("string", "starts_with", vec![Expression::constant("a%")]),
            )
            .build();
        let compiled = compiler.compile(&query).unwrap();
        assert!(compiled.sql().ends_with(r#"WHERE ("o"."customer" LIKE ? ESCAPE '\')"#));
    }

    #[test]
    fn test_throw_mode_rejects_untranslatable_call() {
        let (compiler, sink) = compiler(QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Throw));
        let query = Query::from("Order", "o").filter(reversed_customer()).build();

        let err = compiler.compile(&query).unwrap_err();
        assert_eq!(err.code, ErrorCode::ClientEvaluationDisallowed);
        assert!(err.is_translation_error());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_warn_mode_defers_and_logs() {
        let (compiler, sink) = compiler(QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Warn));
        let query = Query::from("Order", "o")
            .filter(reversed_customer().and(Expression::member("o", "Id").greater_than(0)))
            .order_by(Expression::member("o", "Id"))
            .build();

        let compiled = compiler.compile(&query).unwrap();
        assert_eq!(
            compiled.sql(),
            r#"SELECT "o"."id", "o"."customer" FROM "orders" AS "o" WHERE ("o"."id" > ?)"#
        );
        assert_eq!(compiled.client_operators().len(), 2);
        assert!(matches!(compiled.client_operators()[0], ClientOperator::Filter(_)));
        assert!(matches!(compiled.client_operators()[1], ClientOperator::OrderBy(_)));
        assert_eq!(sink.count(EventId::ClientEvaluation), 2);
        assert_eq!(
            sink.events()[0].get("expression"),
            Some("(o.Customer.reverse() == 'cba')")
        );
    }

    #[test]
    fn test_warning_configured_to_throw() {
        let warnings = WarningsConfigurationBuilder::new()
            .throw(&[EventId::ClientEvaluation])
            .build();
        let (compiler, _) = compiler(QueryOptions::new().warnings(warnings));
        let err = compiler
            .compile(&Query::from("Order", "o").filter(reversed_customer()).build())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::WarningAsError);
    }

    #[test]
    fn test_silent_mode_requires_client_implementation() {
        let (compiler, sink) = compiler(QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Silent));
        let query = Query::from("Order", "o")
            .filter(Expression::member("o", "Customer").call("string", "soundex", vec![]).equal("A"))
            .build();

        let err = compiler.compile(&query).unwrap_err();
        assert_eq!(err.code, ErrorCode::TranslationFailed);

        compiler
            .compile(&Query::from("Order", "o").filter(reversed_customer()).build())
            .unwrap();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_pagination_then_filter_runs_in_process() {
        let (compiler, _) = compiler(QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Silent));
        let query = Query::from("Order", "o")
            .take(5)
            .filter(Expression::member("o", "Id").greater_than(1))
            .build();
        let compiled = compiler.compile(&query).unwrap();
        assert!(compiled.sql().ends_with("LIMIT 5"));
        assert!(!compiled.sql().contains("WHERE"));
        assert_eq!(compiled.client_operators().len(), 1);
    }

    #[test]
    fn test_unknown_member_and_navigation() {
        let (compiler, _) = compiler(QueryOptions::new());
        let err = compiler
            .compile(&Query::from("Order", "o").filter(Expression::member("o", "Total").equal(1)).build())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MemberNotFound);

        let err = compiler
            .compile(&Query::from("Order", "o").include(&["Items"]).build())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NavigationNotFound);

        let err = compiler.compile(&Query::from("Invoice", "i").build()).unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityTypeNotFound);
    }

    #[test]
    fn test_correlated_include_command() {
        let (compiler, _) = compiler(QueryOptions::new());
        let compiled = compiler
            .compile(&Query::from("Order", "o").include(&["Lines"]).build())
            .unwrap();

        let plan = &compiled.includes()[0];
        assert_eq!(plan.names, vec![SmolStr::new("Lines")]);
        let LoaderPlan::Correlated(command) = &plan.loaders[0] else {
            panic!("expected a correlated loader");
        };
        assert_eq!(
            command.command.sql,
            r#"SELECT "t"."id", "t"."order_id", "t"."product" FROM "order_lines" AS "t" WHERE ("t"."order_id" = ?) ORDER BY "t"."id" ASC"#
        );
        assert_eq!(command.key_parameters, vec![SmolStr::new("__key_0")]);
        assert_eq!(command.navigation, "Order.Lines");
        assert_eq!(compiled.include_chains().unwrap().len(), 1);
    }

    #[test]
    fn test_pre_joined_include_groups_rows() {
        let (compiler, _) = compiler(QueryOptions::new().include_strategy(IncludeStrategy::PreJoined));
        let compiled = compiler
            .compile(&Query::from("Order", "o").include(&["Lines"]).take(2).build())
            .unwrap();

        assert_eq!(
            compiled.sql(),
            r#"SELECT "o"."id", "o"."customer", "i0"."id", "i0"."order_id", "i0"."product" FROM "orders" AS "o" LEFT JOIN "order_lines" AS "i0" ON ("o"."id" = "i0"."order_id") ORDER BY "o"."id" ASC, "i0"."id" ASC"#
        );
        assert_eq!(compiled.grouping_key_indices(), &[0]);
        assert_eq!(compiled.client_operators(), &[ClientOperator::Take(2)]);
        let LoaderPlan::PreJoined(slice) = &compiled.includes()[0].loaders[0] else {
            panic!("expected a pre-joined loader");
        };
        assert_eq!((slice.offset, slice.width), (2, 3));
        assert_eq!(slice.match_indices, vec![1]);
    }

    #[test]
    fn test_include_ignored_for_scalar_projection() {
        let (compiler, sink) = compiler(QueryOptions::new());
        let compiled = compiler
            .compile(
                &Query::from("Order", "o")
                    .include(&["Lines"])
                    .select(Projection::Scalar(Expression::member("o", "Customer")))
                    .build(),
            )
            .unwrap();

        assert!(compiled.includes().is_empty());
        assert_eq!(sink.count(EventId::IncludeIgnored), 1);
        assert_eq!(sink.events()[0].get("path"), Some("Lines"));
        assert_eq!(compiled.shaper().root(), &ShaperNode::Scalar(ScalarSource::Column(2)));
    }

    #[test]
    fn test_group_join_shape() {
        let (compiler, _) = compiler(QueryOptions::new());
        let query = Query::from("Order", "o")
            .group_join(
                Query::from("OrderLine", "l"),
                Expression::member("o", "Id"),
                Expression::member("l", "OrderId"),
            )
            .skip(1)
            .build();

        let compiled = compiler.compile(&query).unwrap();
        assert_eq!(
            compiled.sql(),
            r#"SELECT "o"."id", "o"."customer", "l"."id", "l"."order_id", "l"."product" FROM "orders" AS "o" LEFT JOIN "order_lines" AS "l" ON ("o"."id" = "l"."order_id") ORDER BY "o"."id" ASC, "l"."id" ASC"#
        );
        assert_eq!(compiled.shaper().root(), &ShaperNode::Grouping { outer: 0, inner: 1 });
        assert_eq!(compiled.client_operators(), &[ClientOperator::Skip(1)]);
    }

    #[test]
    fn test_invalid_shapes() {
        let (compiler, _) = compiler(QueryOptions::new());
        let after_select = Query::from("Order", "o")
            .select(Projection::Entity("o".into()))
            .filter(Expression::member("o", "Id").equal(1))
            .build();
        assert_eq!(
            compiler.compile(&after_select).unwrap_err().code,
            ErrorCode::InvalidQueryShape
        );

        let inner_filter = Query::from("Order", "o")
            .group_join(
                Query::from("OrderLine", "l"),
                Expression::member("o", "Id"),
                Expression::member("l", "OrderId"),
            )
            .filter(Expression::member("l", "Product").equal("x"))
            .build();
        assert_eq!(
            compiler.compile(&inner_filter).unwrap_err().code,
            ErrorCode::InvalidQueryShape
        );
    }

    #[test]
    fn test_untranslatable_join_key_fails_in_every_mode() {
        let (compiler, _) = compiler(QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Silent));
        let query = Query::from("Order", "o")
            .join(
                Query::from("OrderLine", "l"),
                Expression::member("o", "Customer").call("string", "reverse", vec![]),
                Expression::member("l", "Product"),
            )
            .build();
        assert_eq!(compiler.compile(&query).unwrap_err().code, ErrorCode::TranslationFailed);
    }

    #[test]
    fn test_as_no_tracking_reaches_tracking_infos() {
        let (compiler, _) = compiler(QueryOptions::new());
        let compiled = compiler
            .compile(&Query::from("Order", "o").include(&["Lines"]).as_no_tracking().build())
            .unwrap();
        let info = &compiled.tracking_infos()[0];
        assert!(!info.requires_tracking);
        assert_eq!(info.include_paths, vec![vec![SmolStr::new("Lines")]]);
        assert!(!compiled.includes()[0].requires_tracking);
    }
}
