//! Append-only schema registry.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::{FormSchema, FormType, SchemaError};

/// Maps (form type, tax year) to its published schema.
///
/// Lookups are concurrent; registration takes the write lock and is rejected
/// for a pair that already has a schema, so a published schema can never be
/// silently replaced.
pub struct SchemaRegistry {
    schemas: RwLock<BTreeMap<(FormType, i32), Arc<FormSchema>>>,
}

impl SchemaRegistry {
    /// Empty registry. Most callers want [`SchemaRegistry::with_builtin`].
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry pre-loaded with the built-in form schemas.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        for schema in super::builtin::builtin_schemas() {
            // Built-in keys are unique by construction.
            registry
                .register(schema)
                .expect("built-in schema set contains a duplicate");
        }
        registry
    }

    pub fn register(&self, schema: FormSchema) -> Result<(), SchemaError> {
        let key = (schema.form_type, schema.tax_year);
        let mut map = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(&key) {
            return Err(SchemaError::Conflict {
                form_type: key.0,
                tax_year: key.1,
            });
        }
        map.insert(key, Arc::new(schema));
        Ok(())
    }

    pub fn schema_for(&self, form_type: FormType, tax_year: i32) -> Result<Arc<FormSchema>, SchemaError> {
        let map = self.schemas.read().unwrap_or_else(|e| e.into_inner());
        map.get(&(form_type, tax_year))
            .cloned()
            .ok_or(SchemaError::UnknownForm {
                form_type,
                tax_year,
            })
    }

    /// Distinct form types with at least one registered year, in stable order.
    pub fn supported_forms(&self) -> Vec<FormType> {
        let map = self.schemas.read().unwrap_or_else(|e| e.into_inner());
        let mut forms: Vec<FormType> = map.keys().map(|(ft, _)| *ft).collect();
        forms.dedup();
        forms
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, ValueKind};

    fn schema(form_type: FormType, year: i32, first_key: &str) -> FormSchema {
        FormSchema::new(
            form_type,
            year,
            vec![FieldDefinition::new(first_key, "Label", ValueKind::Text, true)],
        )
    }

    #[test]
    fn lookup_of_unregistered_pair_fails() {
        let registry = SchemaRegistry::new();
        let err = registry.schema_for(FormType::W2, 2025).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnknownForm {
                form_type: FormType::W2,
                tax_year: 2025
            }
        ));
    }

    #[test]
    fn duplicate_registration_conflicts_and_keeps_original() {
        let registry = SchemaRegistry::new();
        registry.register(schema(FormType::W2, 2025, "original")).unwrap();

        let err = registry.register(schema(FormType::W2, 2025, "replacement")).unwrap_err();
        assert!(matches!(err, SchemaError::Conflict { .. }));

        let kept = registry.schema_for(FormType::W2, 2025).unwrap();
        assert_eq!(kept.fields[0].key, "original");
    }

    #[test]
    fn same_form_different_years_coexist() {
        let registry = SchemaRegistry::new();
        registry.register(schema(FormType::K1, 2024, "a")).unwrap();
        registry.register(schema(FormType::K1, 2025, "b")).unwrap();
        assert_eq!(registry.schema_for(FormType::K1, 2024).unwrap().fields[0].key, "a");
        assert_eq!(registry.schema_for(FormType::K1, 2025).unwrap().fields[0].key, "b");
    }

    #[test]
    fn builtin_registry_covers_div_1099() {
        let registry = SchemaRegistry::with_builtin();
        let schema = registry.schema_for(FormType::Div1099, 2025).unwrap();
        assert!(schema.field("total_ordinary_dividends").is_some());
        assert!(registry.supported_forms().contains(&FormType::Div1099));
    }

    #[test]
    fn supported_forms_deduplicates_years() {
        let registry = SchemaRegistry::new();
        registry.register(schema(FormType::W2, 2024, "a")).unwrap();
        registry.register(schema(FormType::W2, 2025, "b")).unwrap();
        assert_eq!(registry.supported_forms(), vec![FormType::W2]);
    }
}
