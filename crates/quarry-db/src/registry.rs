//! The model registry.
//!
//! One registry lives inside each [`Orm`](crate::orm::Orm) context and maps
//! class names to shared [`ModelDescriptor`]s. Registration is idempotent;
//! lookup is case-sensitive first with a case-insensitive fallback scan.
//! [`sorted`](ModelRegistry::sorted) returns descriptors in foreign-key
//! dependency order for schema creation.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use quarry_core::{QuarryError, QuarryResult};

use crate::descriptor::ModelDescriptor;
use crate::model::{Model, ModelSpec};

/// A registry of model descriptors, keyed by class name.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<BTreeMap<String, Arc<ModelDescriptor>>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model type. Repeated registration returns the existing
    /// descriptor unchanged.
    pub fn register<M: Model>(&self) -> Arc<ModelDescriptor> {
        self.register_spec(&M::spec())
    }

    /// Registers a descriptor built from the given spec, idempotently.
    pub fn register_spec(&self, spec: &ModelSpec) -> Arc<ModelDescriptor> {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        models
            .entry(spec.class_name.clone())
            .or_insert_with(|| Arc::new(ModelDescriptor::from_spec(spec)))
            .clone()
    }

    /// Looks up a descriptor by class name: exact match first, then a
    /// case-insensitive scan.
    pub fn descriptor(&self, name: &str) -> QuarryResult<Arc<ModelDescriptor>> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(desc) = models.get(name) {
            return Ok(desc.clone());
        }
        for (key, desc) in models.iter() {
            if key.eq_ignore_ascii_case(name) {
                return Ok(desc.clone());
            }
        }
        Err(QuarryError::UnknownModel(name.to_string()))
    }

    /// Returns the registered class names.
    pub fn names(&self) -> Vec<String> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        models.keys().cloned().collect()
    }

    /// Returns all descriptors in foreign-key dependency order: a model
    /// appears after every model it references. Self-references are
    /// allowed; any longer cycle is an error.
    pub fn sorted(&self) -> QuarryResult<Vec<Arc<ModelDescriptor>>> {
        let names = self.names();
        let mut state: BTreeMap<String, Visit> = BTreeMap::new();
        let mut out = Vec::new();
        for name in names {
            self.visit(&name, &mut state, &mut out)?;
        }
        Ok(out)
    }

    fn visit(
        &self,
        name: &str,
        state: &mut BTreeMap<String, Visit>,
        out: &mut Vec<Arc<ModelDescriptor>>,
    ) -> QuarryResult<()> {
        let desc = self.descriptor(name)?;
        let key = desc.class_name().to_string();
        match state.get(&key) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                return Err(QuarryError::DependencyCycle(key));
            }
            None => {}
        }
        state.insert(key.clone(), Visit::InProgress);
        for target in desc.foreign_fields().values() {
            if target.eq_ignore_ascii_case(&key) {
                continue;
            }
            self.visit(target, state, out)?;
        }
        state.insert(key, Visit::Done);
        out.push(desc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;

    fn author() -> ModelSpec {
        ModelSpec::new("Author").property("name", FieldType::Text, "max_length=45")
    }

    fn book() -> ModelSpec {
        ModelSpec::new("Book")
            .property("title", FieldType::Text, "max_length=255")
            .foreign("author", "Author", "on_delete=cascade")
    }

    #[test]
    fn test_registration_is_idempotent() {
        let registry = ModelRegistry::new();
        let first = registry.register_spec(&author());
        let second = registry.register_spec(&author());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.names(), ["Author"]);
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let registry = ModelRegistry::new();
        registry.register_spec(&author());
        assert!(registry.descriptor("Author").is_ok());
        assert_eq!(registry.descriptor("author").unwrap().class_name(), "Author");
        assert!(registry.descriptor("Publisher").is_err());
    }

    #[test]
    fn test_dependency_order() {
        let registry = ModelRegistry::new();
        registry.register_spec(&book());
        registry.register_spec(&author());
        let sorted = registry.sorted().unwrap();
        let names: Vec<&str> = sorted.iter().map(|d| d.class_name()).collect();
        assert_eq!(names, ["Author", "Book"]);
    }

    #[test]
    fn test_self_reference_allowed() {
        let registry = ModelRegistry::new();
        let spec = ModelSpec::new("Category")
            .property("name", FieldType::Text, "max_length=45")
            .foreign("parent", "Category", "null=true");
        registry.register_spec(&spec);
        assert_eq!(registry.sorted().unwrap().len(), 1);
    }

    #[test]
    fn test_cycle_detected() {
        let registry = ModelRegistry::new();
        registry.register_spec(&ModelSpec::new("A").foreign("b", "B", ""));
        registry.register_spec(&ModelSpec::new("B").foreign("a", "A", ""));
        let err = registry.sorted().unwrap_err();
        assert!(matches!(err, QuarryError::DependencyCycle(_)));
    }

    #[test]
    fn test_missing_foreign_target_errors() {
        let registry = ModelRegistry::new();
        registry.register_spec(&book());
        assert!(registry.sorted().is_err());
    }
}
