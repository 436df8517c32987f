//! Query executor: base query, filters, sorts and pagination, strictly in that order.

use super::{
    apply_filters, apply_select, apply_sorts, parse_sort, resolve_pagination, FilterParser, PaginationDefaults,
    PaginationMode,
};
use crate::error::AppError;
use crate::gate::CompiledGate;
use crate::request::GateRequest;
use crate::service::Validator;
use crate::sql::SelectQuery;
use crate::store::{cursor_paginate, get, paginate, EntityStore, PageResult};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryStage {
    Initialized,
    BaseQueryApplied,
    FiltersApplied,
    SortApplied,
    Paginated,
}

/// Per-request state threaded through the pipeline.
pub struct QueryContext<'a> {
    pub gate: &'a CompiledGate,
    pub request: &'a GateRequest,
    pub query: SelectQuery,
    pub stage: QueryStage,
}

impl<'a> QueryContext<'a> {
    pub fn new(gate: &'a CompiledGate, request: &'a GateRequest) -> Self {
        let mut query = SelectQuery::new();
        apply_select(&mut query, gate);
        Self {
            gate,
            request,
            query,
            stage: QueryStage::Initialized,
        }
    }

    /// Run the base-query transform. A returned query replaces the current one.
    pub fn apply_base_query(&mut self) {
        if let Some(base) = &self.gate.base_query {
            if let Some(replacement) = base(&mut self.query, self.request) {
                self.query = replacement;
            }
        }
        self.stage = QueryStage::BaseQueryApplied;
    }
}

#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn EntityStore>,
    validator: Arc<dyn Validator>,
    defaults: PaginationDefaults,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn EntityStore>, validator: Arc<dyn Validator>, defaults: PaginationDefaults) -> Self {
        Self {
            store,
            validator,
            defaults,
        }
    }

    /// Filter parsing errors abort before any sort or pagination work.
    pub async fn execute(&self, gate: &CompiledGate, request: &GateRequest) -> Result<PageResult, AppError> {
        let mut ctx = QueryContext::new(gate, request);
        ctx.apply_base_query();

        let instructions = FilterParser::new(&gate.filters, &gate.operators, self.validator.as_ref())
            .with_raw_fields(gate.raw_filters.keys().map(String::as_str))
            .parse(&request.filters)?;
        apply_filters(&mut ctx.query, gate, &instructions);
        ctx.stage = QueryStage::FiltersApplied;

        apply_sorts(&mut ctx.query, gate, &parse_sort(request.sort.as_deref()));
        ctx.stage = QueryStage::SortApplied;

        let mode = request.pagination.as_deref().unwrap_or(gate.pagination.as_str());
        let plan = resolve_pagination(Some(mode), request.per_page, request.cursor.as_deref(), self.defaults);
        let store = self.store.as_ref();
        let source = &gate.source;
        let result = match (plan.mode, plan.per_page) {
            (PaginationMode::Cursor, Some(per_page)) => {
                PageResult::Cursor(cursor_paginate(store, source, ctx.query, per_page, plan.cursor.as_deref()).await?)
            }
            (PaginationMode::Classic, Some(per_page)) => {
                PageResult::Classic(paginate(store, source, ctx.query, per_page, request.page.unwrap_or(1)).await?)
            }
            _ => PageResult::All(get(store, source, ctx.query).await?),
        };
        tracing::debug!(
            entity = %gate.entity,
            version = ?gate.version,
            mode = %plan.mode,
            rows = result.rows().len(),
            "query executed"
        );
        Ok(result)
    }
}
