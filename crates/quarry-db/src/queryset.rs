//! The queryset execution engine.
//!
//! A [`QuerySet`] is a lazy, composable query bound to one model type.
//! Chain calls (`filter`, `exclude`, `order_by`, `limit`, `select_related`)
//! each produce a *derived* queryset with its own private state and an
//! empty row cache, so no two querysets ever share mutable storage.
//! Nothing touches the database until a terminal method runs (`count`,
//! `size`, `at`, `get`, iteration, `values`, `update`, `remove`,
//! `aggregate`).
//!
//! Fetched rows are cached for the lifetime of the queryset; any mutating
//! execution invalidates the cache, on failure as well as on success, so
//! stale data is never served.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use quarry_core::{QuarryError, QuarryResult};

use crate::channel::Row;
use crate::compiler::Compiler;
use crate::dialect::Dialect;
use crate::filter::Filter;
use crate::model::Model;
use crate::orm::Orm;
use crate::value::Value;

/// An aggregate function over one column or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// `AVG(...)`
    Avg,
    /// `COUNT(...)`
    Count,
    /// `SUM(...)`
    Sum,
    /// `MIN(...)`
    Min,
    /// `MAX(...)`
    Max,
}

impl Aggregate {
    const fn sql_name(self) -> &'static str {
        match self {
            Self::Avg => "AVG",
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// The private state behind a queryset: accumulated query description plus
/// the row cache. Also used directly by descriptor save/remove, which build
/// the same statements without a typed model parameter.
pub(crate) struct QueryState {
    orm: Orm,
    model: String,
    where_clause: Filter,
    order_by: Vec<String>,
    low_mark: usize,
    high_mark: usize,
    select_related: bool,
    related_fields: Vec<String>,
    rows: Vec<Vec<Value>>,
    has_results: bool,
}

impl QueryState {
    pub(crate) fn new(orm: Orm, model: String) -> Self {
        Self {
            orm,
            model,
            where_clause: Filter::all(),
            order_by: Vec::new(),
            low_mark: 0,
            high_mark: 0,
            select_related: false,
            related_fields: Vec::new(),
            rows: Vec::new(),
            has_results: false,
        }
    }

    /// Copies the query description into a fresh state with an empty cache.
    fn derived(&self) -> Self {
        Self {
            orm: self.orm.clone(),
            model: self.model.clone(),
            where_clause: self.where_clause.clone(),
            order_by: self.order_by.clone(),
            low_mark: self.low_mark,
            high_mark: self.high_mark,
            select_related: self.select_related,
            related_fields: self.related_fields.clone(),
            rows: Vec::new(),
            has_results: false,
        }
    }

    fn invalidate(&mut self) {
        self.rows.clear();
        self.has_results = false;
    }

    fn sliced(&self) -> bool {
        self.low_mark != 0 || self.high_mark != 0
    }

    /// ANDs a predicate into the accumulated WHERE clause.
    ///
    /// # Panics
    ///
    /// Panics if a limit has already been set: slicing fixes result
    /// identity, so further filtering is a programming error.
    pub(crate) fn add_filter(&mut self, filter: Filter) {
        assert!(
            !self.sliced(),
            "cannot add filters once a limit has been set"
        );
        self.where_clause = std::mem::take(&mut self.where_clause) & filter;
    }

    fn related_selection(&self) -> Option<&[String]> {
        if self.select_related && !self.related_fields.is_empty() {
            Some(self.related_fields.as_slice())
        } else {
            None
        }
    }

    // ── Statement builders ───────────────────────────────────────────

    fn select_query(&self) -> QuarryResult<(String, Vec<Value>)> {
        let dialect = self.orm.dialect();
        let mut compiler = Compiler::new(&self.model, self.orm.models(), dialect)?;
        let mut where_clause = self.where_clause.clone();
        compiler.resolve(&mut where_clause)?;

        let columns = compiler.field_names(self.select_related, self.related_selection())?;
        let where_sql = where_clause.sql(dialect);
        let limit = compiler.order_limit_sql(&self.order_by, self.low_mark, self.high_mark)?;
        let from = compiler.from_sql()?;

        let mut sql = format!("SELECT {} FROM {from}", columns.join(", "));
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        sql.push_str(&limit);

        let mut params = Vec::new();
        where_clause.bind_values(&mut params);
        Ok((sql, params))
    }

    fn aggregate_query(&self, func: Aggregate, field: &str) -> QuarryResult<(String, Vec<Value>)> {
        let dialect = self.orm.dialect();
        let mut compiler = Compiler::new(&self.model, self.orm.models(), dialect)?;
        let mut where_clause = self.where_clause.clone();
        compiler.resolve(&mut where_clause)?;

        let where_sql = where_clause.sql(dialect);
        let limit = compiler.order_limit_sql(&[], self.low_mark, self.high_mark)?;
        let from = compiler.from_sql()?;

        let mut sql = format!("SELECT {}({field}) FROM {from}", func.sql_name());
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        sql.push_str(&limit);

        let mut params = Vec::new();
        where_clause.bind_values(&mut params);
        Ok((sql, params))
    }

    fn update_query(
        &self,
        fields: &BTreeMap<String, Value>,
    ) -> QuarryResult<(String, Vec<Value>)> {
        let dialect = self.orm.dialect();
        let descriptor = self.orm.descriptor(&self.model)?;
        let mut compiler = Compiler::new(&self.model, self.orm.models(), dialect)?;
        let mut where_clause = self.where_clause.clone();
        compiler.resolve(&mut where_clause)?;
        let from = compiler.from_sql()?;

        let mut params = Vec::new();
        let mut assignments = Vec::new();
        for (name, value) in fields {
            let column = dialect.quote_ident(&descriptor.local_field(name)?.column);
            assignments.push(format!("{column} = ?"));
            params.push(value.clone());
        }

        let mut sql = format!("UPDATE {from} SET {}", assignments.join(", "));
        let where_sql = where_clause.sql(dialect);
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        where_clause.bind_values(&mut params);
        Ok((sql, params))
    }

    fn delete_query(&self) -> QuarryResult<(String, Vec<Value>)> {
        let dialect = self.orm.dialect();
        let mut compiler = Compiler::new(&self.model, self.orm.models(), dialect)?;
        let mut where_clause = self.where_clause.clone();
        compiler.resolve(&mut where_clause)?;

        let where_sql = where_clause.sql(dialect);
        let limit = compiler.order_limit_sql(&self.order_by, self.low_mark, self.high_mark)?;
        let from = compiler.from_sql()?;

        let mut sql = format!("DELETE FROM {from}");
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        sql.push_str(&limit);

        let mut params = Vec::new();
        where_clause.bind_values(&mut params);
        Ok((sql, params))
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Fetches and caches the result rows, once. A match-nothing clause
    /// never issues SQL.
    pub(crate) fn sql_fetch(&mut self) -> QuarryResult<()> {
        if self.has_results || self.where_clause.is_none() {
            return Ok(());
        }
        let (sql, params) = self.select_query()?;
        let rows = self.orm.run_query(&sql, &params)?;
        self.rows = rows.into_iter().map(Row::into_values).collect();
        self.has_results = true;
        Ok(())
    }

    /// Builds and executes an INSERT. With `want_id`, retrieves the
    /// generated key through the dialect's mechanism (a `CURRVAL` sequence
    /// query on PostgreSQL, the channel's last-insert-id elsewhere).
    pub(crate) fn sql_insert(
        &mut self,
        fields: &BTreeMap<String, Value>,
        want_id: bool,
    ) -> QuarryResult<Option<Value>> {
        let dialect = self.orm.dialect();
        let descriptor = self.orm.descriptor(&self.model)?;

        let mut columns = Vec::new();
        let mut holders = Vec::new();
        let mut params = Vec::new();
        for (name, value) in fields {
            columns.push(dialect.quote_ident(&descriptor.local_field(name)?.column));
            holders.push("?");
            params.push(value.clone());
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES({})",
            dialect.quote_ident(descriptor.table()),
            columns.join(", "),
            holders.join(", ")
        );

        self.invalidate();
        if !want_id {
            self.orm.run_execute(&sql, &params)?;
            return Ok(None);
        }

        if dialect == Dialect::Postgres {
            self.orm.run_execute(&sql, &params)?;
            let pk = descriptor.local_field("pk")?;
            let sequence = dialect.quote_ident(&format!("{}_{}_seq", descriptor.table(), pk.column));
            let rows = self
                .orm
                .run_query(&format!("SELECT CURRVAL('{sequence}')"), &[])?;
            Ok(rows
                .into_iter()
                .next()
                .and_then(|row| row.into_values().into_iter().next()))
        } else {
            Ok(Some(self.orm.run_insert(&sql, &params)?))
        }
    }

    /// Builds and executes an UPDATE; a match-nothing clause is a no-op
    /// success and a sliced queryset is refused.
    pub(crate) fn sql_update(&mut self, fields: &BTreeMap<String, Value>) -> QuarryResult<u64> {
        if self.where_clause.is_none() || fields.is_empty() {
            return Ok(0);
        }
        if self.sliced() {
            return Err(QuarryError::Unsupported(
                "cannot update a query set once a limit has been set".to_string(),
            ));
        }
        let (sql, params) = self.update_query(fields)?;
        self.invalidate();
        self.orm.run_execute(&sql, &params)
    }

    /// Builds and executes a DELETE under the same rules as
    /// [`sql_update`](Self::sql_update).
    pub(crate) fn sql_delete(&mut self) -> QuarryResult<u64> {
        if self.where_clause.is_none() {
            return Ok(0);
        }
        if self.sliced() {
            return Err(QuarryError::Unsupported(
                "cannot delete from a query set once a limit has been set".to_string(),
            ));
        }
        let (sql, params) = self.delete_query()?;
        self.invalidate();
        self.orm.run_execute(&sql, &params)
    }

    fn sql_aggregate(&self, func: Aggregate, field: &str) -> QuarryResult<Value> {
        let (sql, params) = self.aggregate_query(func, field)?;
        let rows = self.orm.run_query(&sql, &params)?;
        rows.into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .ok_or_else(|| QuarryError::Database("aggregate query returned no rows".to_string()))
    }

    /// Number of cached rows (zero before the first fetch).
    pub(crate) fn cached_len(&self) -> usize {
        self.rows.len()
    }

    /// Materializes one cached row onto a model instance.
    pub(crate) fn sql_load(&self, instance: &mut dyn Model, index: usize) -> QuarryResult<()> {
        let row = self.rows.get(index).ok_or_else(|| {
            QuarryError::NotFound(format!(
                "index {index} out of bounds for query set of size {}",
                self.rows.len()
            ))
        })?;
        let descriptor = self.orm.descriptor(&self.model)?;
        let mut pos = 0;
        descriptor.load(
            self.orm.models(),
            instance,
            row,
            &mut pos,
            self.related_selection(),
        )
    }

    fn field_positions(&self, fields: &[String]) -> QuarryResult<Vec<(String, usize)>> {
        let descriptor = self.orm.descriptor(&self.model)?;
        let local = descriptor.local_fields();
        if fields.is_empty() {
            return Ok(local
                .iter()
                .enumerate()
                .map(|(i, f)| (f.name.clone(), i))
                .collect());
        }
        fields
            .iter()
            .map(|name| {
                local
                    .iter()
                    .position(|f| &f.name == name)
                    .map(|pos| (name.clone(), pos))
                    .ok_or_else(|| QuarryError::UnknownField(format!("{}.{name}", self.model)))
            })
            .collect()
    }

    fn project(&self, positions: &[(String, usize)], row: &[Value]) -> QuarryResult<Vec<Value>> {
        positions
            .iter()
            .map(|(_, pos)| {
                row.get(*pos).cloned().ok_or_else(|| {
                    QuarryError::Database(format!("cached row has no column {pos}"))
                })
            })
            .collect()
    }
}

/// A lazy, composable query bound to the model type `M`.
pub struct QuerySet<M: Model> {
    state: QueryState,
    marker: PhantomData<M>,
}

impl<M: Model + Default> QuerySet<M> {
    /// Creates a queryset over every row of `M`'s table. Fails when `M`
    /// has not been registered with the context.
    pub(crate) fn new(orm: &Orm) -> QuarryResult<Self> {
        let class = M::class_name();
        orm.models().descriptor(&class)?;
        Ok(Self {
            state: QueryState::new(orm.clone(), class),
            marker: PhantomData,
        })
    }

    fn branch(state: QueryState) -> Self {
        Self {
            state,
            marker: PhantomData,
        }
    }

    // ── Chaining (lazy) ──────────────────────────────────────────────

    /// A copy of this queryset with its own empty cache.
    #[must_use]
    pub fn all(&self) -> Self {
        Self::branch(self.state.derived())
    }

    /// ANDs a predicate into the WHERE clause of a derived queryset.
    #[must_use]
    pub fn filter(&self, filter: Filter) -> Self {
        let mut qs = self.all();
        qs.state.add_filter(filter);
        qs
    }

    /// ANDs the negation of a predicate into a derived queryset.
    #[must_use]
    pub fn exclude(&self, filter: Filter) -> Self {
        let mut qs = self.all();
        qs.state.add_filter(!filter);
        qs
    }

    /// A queryset matching nothing; terminal reads return empty results
    /// without issuing SQL.
    #[must_use]
    pub fn none(&self) -> Self {
        let mut state = QueryState::new(self.state.orm.clone(), self.state.model.clone());
        state.where_clause = Filter::none();
        Self::branch(state)
    }

    /// Appends ordering keys (`-` prefix for descending).
    ///
    /// # Panics
    ///
    /// Panics if a limit has already been set.
    #[must_use]
    pub fn order_by(&self, keys: &[&str]) -> Self {
        assert!(
            !self.state.sliced(),
            "cannot change ordering once a limit has been set"
        );
        let mut qs = self.all();
        qs.state
            .order_by
            .extend(keys.iter().map(ToString::to_string));
        qs
    }

    /// Slices the queryset: skip `pos` rows, then take `length` rows when
    /// given. Composes with an existing slice by adding offsets and
    /// clamping to the outer window's end.
    #[must_use]
    pub fn limit(&self, pos: usize, length: Option<usize>) -> Self {
        let mut qs = self.all();
        qs.state.low_mark += pos;
        if let Some(length) = length {
            if length > 0 {
                qs.state.high_mark = qs.state.low_mark + length;
                if self.state.high_mark > 0 && qs.state.high_mark > self.state.high_mark {
                    qs.state.high_mark = self.state.high_mark;
                }
            }
        }
        qs
    }

    /// Eagerly selects the columns of related models so foreign-key
    /// targets load from the same query. With an empty list every relation
    /// is followed recursively; otherwise only the named paths.
    #[must_use]
    pub fn select_related(&self, fields: &[&str]) -> Self {
        let mut qs = self.all();
        qs.state.select_related = true;
        qs.state.related_fields = fields.iter().map(ToString::to_string).collect();
        qs
    }

    // ── Inspection ───────────────────────────────────────────────────

    /// The accumulated WHERE clause with field paths resolved to columns,
    /// for inspection and diagnostics.
    pub fn where_clause(&self) -> QuarryResult<Filter> {
        let mut compiler = Compiler::new(
            &self.state.model,
            self.state.orm.models(),
            self.state.orm.dialect(),
        )?;
        let mut where_clause = self.state.where_clause.clone();
        compiler.resolve(&mut where_clause)?;
        Ok(where_clause)
    }

    /// The SELECT statement and bind values this queryset would execute,
    /// for inspection and tests.
    pub fn select_sql(&self) -> QuarryResult<(String, Vec<Value>)> {
        self.state.select_query()
    }

    // ── Terminal operations ──────────────────────────────────────────

    /// The number of matching rows: the cached size when fetched, a
    /// `SELECT COUNT(*)` otherwise.
    pub fn count(&self) -> QuarryResult<usize> {
        if self.state.has_results {
            return Ok(self.state.rows.len());
        }
        let value = self.state.sql_aggregate(Aggregate::Count, "*")?;
        Ok(usize::try_from(value.as_int().unwrap_or(0)).unwrap_or(0))
    }

    /// Fetches (once) and returns the number of cached rows.
    pub fn size(&mut self) -> QuarryResult<usize> {
        self.state.sql_fetch()?;
        Ok(self.state.rows.len())
    }

    /// Fetches (once) and materializes the row at `index`.
    pub fn at(&mut self, index: usize) -> QuarryResult<M> {
        self.state.sql_fetch()?;
        let mut instance = M::default();
        self.state.sql_load(&mut instance, index)?;
        Ok(instance)
    }

    /// Returns the single instance matching `filter`, or `NotFound` when
    /// zero or several rows match.
    pub fn get(&self, filter: Filter) -> QuarryResult<M> {
        let mut qs = self.filter(filter);
        if qs.size()? == 1 {
            qs.at(0)
        } else {
            Err(QuarryError::NotFound(format!(
                "{} matching query does not return exactly one row",
                self.state.model
            )))
        }
    }

    /// Fetches (once) and iterates over materialized instances.
    pub fn iter(&mut self) -> QuarryResult<Iter<'_, M>> {
        self.state.sql_fetch()?;
        Ok(Iter {
            qs: self,
            index: 0,
        })
    }

    /// Executes an UPDATE of the given fields over the matching rows and
    /// returns the affected-row count. Refused on a sliced queryset; a
    /// match-nothing clause is a no-op success.
    pub fn update(&mut self, fields: &[(&str, Value)]) -> QuarryResult<u64> {
        let map: BTreeMap<String, Value> = fields
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect();
        self.state.sql_update(&map)
    }

    /// Executes a DELETE over the matching rows and returns the
    /// affected-row count, under the same rules as [`update`](Self::update).
    pub fn remove(&mut self) -> QuarryResult<u64> {
        self.state.sql_delete()
    }

    /// Fetches (once) and projects the cached rows into maps of the named
    /// fields (all local fields when empty). Requesting an unknown field
    /// is an error.
    pub fn values(&mut self, fields: &[&str]) -> QuarryResult<Vec<BTreeMap<String, Value>>> {
        let fields: Vec<String> = fields.iter().map(ToString::to_string).collect();
        self.state.sql_fetch()?;
        let positions = self.state.field_positions(&fields)?;
        let mut out = Vec::with_capacity(self.state.rows.len());
        for row in &self.state.rows {
            let projected = self.state.project(&positions, row)?;
            out.push(
                positions
                    .iter()
                    .map(|(name, _)| name.clone())
                    .zip(projected)
                    .collect(),
            );
        }
        Ok(out)
    }

    /// Like [`values`](Self::values), but projects into positional lists.
    pub fn values_list(&mut self, fields: &[&str]) -> QuarryResult<Vec<Vec<Value>>> {
        let fields: Vec<String> = fields.iter().map(ToString::to_string).collect();
        self.state.sql_fetch()?;
        let positions = self.state.field_positions(&fields)?;
        self.state
            .rows
            .iter()
            .map(|row| self.state.project(&positions, row))
            .collect()
    }

    /// Executes `SELECT <FUNC>(<field>) ...` over the matching rows,
    /// bypassing the row cache. `field` is passed through verbatim, so
    /// expressions like `*` or `price*quantity` work.
    pub fn aggregate(&self, func: Aggregate, field: &str) -> QuarryResult<Value> {
        self.state.sql_aggregate(func, field)
    }
}

/// Iterator over the materialized instances of a fetched queryset.
pub struct Iter<'a, M: Model> {
    qs: &'a QuerySet<M>,
    index: usize,
}

impl<M: Model + Default> Iterator for Iter<'_, M> {
    type Item = QuarryResult<M>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.qs.state.rows.len() {
            return None;
        }
        let mut instance = M::default();
        let result = self
            .qs
            .state
            .sql_load(&mut instance, self.index)
            .map(|()| instance);
        self.index += 1;
        Some(result)
    }
}
