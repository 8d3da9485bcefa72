//! The ORM context object.
//!
//! An [`Orm`] owns the model registry, the per-thread connection registry
//! and the debug toggle. It is a cheap, cloneable handle: clone it into
//! worker threads and every entry point of the engine works through it.
//! There is no process-global state.
//!
//! # Examples
//!
//! ```no_run
//! # use quarry_db::orm::Orm;
//! # use quarry_db::channel::ChannelFactory;
//! # fn factory() -> Box<dyn ChannelFactory> { unimplemented!() }
//! let orm = Orm::open(factory()).unwrap();
//! orm.set_debug(true);
//! orm.create_tables().unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use quarry_core::{QuarryError, QuarryResult};

use crate::channel::{ChannelFactory, ExecutionChannel, Row};
use crate::connections::ConnectionRegistry;
use crate::descriptor::ModelDescriptor;
use crate::dialect::Dialect;
use crate::model::{Model, ModelSpec};
use crate::queryset::QuerySet;
use crate::registry::ModelRegistry;
use crate::value::Value;

struct OrmInner {
    models: ModelRegistry,
    connections: ConnectionRegistry,
    debug: AtomicBool,
}

/// A handle to one ORM context. Cloning is cheap and all clones share the
/// same registries.
#[derive(Clone)]
pub struct Orm {
    inner: Arc<OrmInner>,
}

impl std::fmt::Debug for Orm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm").finish_non_exhaustive()
    }
}

impl Orm {
    /// Opens the canonical connection through `factory` and builds a fresh
    /// context around it. The calling thread becomes the connection owner;
    /// other threads are served dialect-identical clones on demand.
    ///
    /// Fails if the connection cannot be opened or its dialect cannot be
    /// determined.
    pub fn open(factory: Box<dyn ChannelFactory>) -> QuarryResult<Self> {
        let connections = ConnectionRegistry::new(factory)?;
        if connections.dialect() == Dialect::Unknown {
            return Err(QuarryError::Configuration(
                "could not determine the database dialect".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(OrmInner {
                models: ModelRegistry::new(),
                connections,
                debug: AtomicBool::new(false),
            }),
        })
    }

    /// The dialect of the underlying database.
    pub fn dialect(&self) -> Dialect {
        self.inner.connections.dialect()
    }

    /// The model registry.
    pub fn models(&self) -> &ModelRegistry {
        &self.inner.models
    }

    /// Registers a model type; repeated registration returns the existing
    /// descriptor.
    pub fn register<M: Model>(&self) -> Arc<ModelDescriptor> {
        self.inner.models.register::<M>()
    }

    /// Registers a descriptor from a spec, idempotently.
    pub fn register_spec(&self, spec: &ModelSpec) -> Arc<ModelDescriptor> {
        self.inner.models.register_spec(spec)
    }

    /// Looks up a registered descriptor by class name.
    pub fn descriptor(&self, name: &str) -> QuarryResult<Arc<ModelDescriptor>> {
        self.inner.models.descriptor(name)
    }

    /// All registered descriptors, in foreign-key dependency order.
    pub fn descriptors(&self) -> QuarryResult<Vec<Arc<ModelDescriptor>>> {
        self.inner.models.sorted()
    }

    /// A fresh queryset over every row of `M`'s table.
    pub fn objects<M: Model + Default>(&self) -> QuarryResult<QuerySet<M>> {
        QuerySet::new(self)
    }

    /// Saves a model instance (UPDATE when its primary key exists, INSERT
    /// otherwise).
    pub fn save<M: Model>(&self, instance: &mut M) -> QuarryResult<()> {
        let descriptor = self.descriptor(&M::class_name())?;
        descriptor.save(self, instance)
    }

    /// Deletes the row matching the instance's primary key.
    pub fn delete<M: Model>(&self, instance: &M) -> QuarryResult<()> {
        let descriptor = self.descriptor(&M::class_name())?;
        descriptor.remove(self, instance)
    }

    /// Creates the tables of every registered model, dependencies first.
    pub fn create_tables(&self) -> QuarryResult<()> {
        for descriptor in self.descriptors()? {
            descriptor.create_table(self)?;
        }
        Ok(())
    }

    /// Drops every registered table, in reverse dependency order. Tables
    /// absent from the live schema are skipped.
    pub fn drop_tables(&self) -> QuarryResult<()> {
        for descriptor in self.descriptors()?.iter().rev() {
            descriptor.drop_table(self)?;
        }
        Ok(())
    }

    /// Toggles statement logging: when enabled, every executed statement
    /// and its bound parameters are emitted at debug level on the
    /// `quarry_db` target.
    pub fn set_debug(&self, enabled: bool) {
        self.inner.debug.store(enabled, Ordering::Relaxed);
    }

    /// Whether statement logging is enabled.
    pub fn is_debug(&self) -> bool {
        self.inner.debug.load(Ordering::Relaxed)
    }

    // ── Statement execution ──────────────────────────────────────────

    fn with_channel<T>(
        &self,
        f: impl FnOnce(&mut dyn ExecutionChannel) -> QuarryResult<T>,
    ) -> QuarryResult<T> {
        let handle = self.inner.connections.acquire()?;
        let mut channel = handle.lock().unwrap_or_else(PoisonError::into_inner);
        f(channel.as_mut())
    }

    fn log_statement(&self, sql: &str, params: &[Value]) {
        if self.is_debug() {
            tracing::debug!(target: "quarry_db", sql, params = ?params, "executing statement");
        }
    }

    /// Runs a query on the calling thread's channel.
    pub(crate) fn run_query(&self, sql: &str, params: &[Value]) -> QuarryResult<Vec<Row>> {
        self.log_statement(sql, params);
        self.with_channel(|channel| channel.query(sql, params))
    }

    /// Runs a non-query statement on the calling thread's channel.
    pub(crate) fn run_execute(&self, sql: &str, params: &[Value]) -> QuarryResult<u64> {
        self.log_statement(sql, params);
        self.with_channel(|channel| channel.execute(sql, params))
    }

    /// Runs an INSERT and fetches the generated key, holding the channel
    /// for the whole exchange.
    pub(crate) fn run_insert(&self, sql: &str, params: &[Value]) -> QuarryResult<Value> {
        self.log_statement(sql, params);
        self.with_channel(|channel| {
            channel.execute(sql, params)?;
            channel.last_insert_id()
        })
    }

    /// Lists the tables in the live schema.
    pub fn table_names(&self) -> QuarryResult<Vec<String>> {
        self.with_channel(|channel| channel.table_names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::FakeFactory;
    use crate::fields::FieldType;

    fn orm() -> Orm {
        Orm::open(Box::new(FakeFactory::new(Dialect::Sqlite))).unwrap()
    }

    #[test]
    fn test_open_rejects_unknown_dialect() {
        let err = Orm::open(Box::new(FakeFactory::new(Dialect::Unknown))).unwrap_err();
        assert!(matches!(err, QuarryError::Configuration(_)));
    }

    #[test]
    fn test_debug_toggle() {
        let orm = orm();
        assert!(!orm.is_debug());
        orm.set_debug(true);
        assert!(orm.is_debug());
        orm.set_debug(false);
        assert!(!orm.is_debug());
    }

    #[test]
    fn test_registration_surface() {
        let orm = orm();
        let spec = ModelSpec::new("Gadget").property("name", FieldType::Text, "max_length=45");
        let first = orm.register_spec(&spec);
        let second = orm.register_spec(&spec);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(orm.descriptor("gadget").is_ok());
        assert!(orm.descriptor("Widget").is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let orm = orm();
        let clone = orm.clone();
        clone.set_debug(true);
        assert!(orm.is_debug());
        orm.register_spec(&ModelSpec::new("Gadget"));
        assert!(clone.descriptor("Gadget").is_ok());
    }
}
