//! Entity registry
//!
//! An entity is one logical registry table: a name, the masks of the files
//! that carry its inserts and deletes, and the destination it is bound to.
//! Descriptors are loaded once and never change afterwards.

pub mod mask;

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::error::{IngestError, Result};
pub use mask::FileMask;

/// Registry shipped with the binary, used when no registry file is configured
pub const DEFAULT_REGISTRY: &str = include_str!("../../resources/entities.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Date,
    Bool,
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    name: String,
    description: String,
    insert_mask: Option<FileMask>,
    delete_mask: Option<FileMask>,
    partitions: u32,
    fields: Vec<EntityField>,
}

impl EntityDescriptor {
    /// Build a descriptor. The name is trimmed and lowercased so lookups
    /// ignore case and surrounding whitespace.
    pub fn new(
        name: &str,
        insert_mask: Option<&str>,
        delete_mask: Option<&str>,
        partitions: u32,
        fields: Vec<EntityField>,
    ) -> Result<Self> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(IngestError::Config("entity name is empty".to_string()));
        }
        if partitions == 0 {
            return Err(IngestError::Config(format!(
                "entity '{}' must have at least one partition",
                name
            )));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            let field_name = normalize_name(&field.name);
            if field_name.is_empty() {
                return Err(IngestError::Config(format!("entity '{}' has an unnamed field", name)));
            }
            if !seen.insert(field_name) {
                return Err(IngestError::Config(format!(
                    "entity '{}' declares field '{}' twice",
                    name, field.name
                )));
            }
            if field.primary && field.indexed {
                return Err(IngestError::Config(format!(
                    "field '{}' of entity '{}' cannot be both primary and indexed",
                    field.name, name
                )));
            }
        }

        Ok(Self {
            name,
            description: String::new(),
            insert_mask: insert_mask.map(FileMask::new).transpose()?,
            delete_mask: delete_mask.map(FileMask::new).transpose()?,
            partitions,
            fields,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn fields(&self) -> &[EntityField] {
        &self.fields
    }

    pub fn is_insert_file(&self, file_name: &str) -> bool {
        self.insert_mask.as_ref().is_some_and(|m| m.matches(file_name))
    }

    pub fn is_delete_file(&self, file_name: &str) -> bool {
        self.delete_mask.as_ref().is_some_and(|m| m.matches(file_name))
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Lookup of entities by file name plus their destination bindings
pub trait EntityManager: Send + Sync {
    fn descriptor_by_insert_file(&self, file_name: &str) -> Option<Arc<EntityDescriptor>>;

    fn descriptor_by_delete_file(&self, file_name: &str) -> Option<Arc<EntityDescriptor>>;

    /// Destination bound to `descriptor`; `None` means nothing consumes it
    fn binding_for(&self, descriptor: &EntityDescriptor) -> Option<String>;

    fn descriptor_by_name(&self, name: &str) -> Option<Arc<EntityDescriptor>>;

    fn descriptors(&self) -> Vec<Arc<EntityDescriptor>>;

    /// Entity owning `file_name`, checking insert masks before delete masks
    fn descriptor_for_file(&self, file_name: &str) -> Option<Arc<EntityDescriptor>> {
        self.descriptor_by_insert_file(file_name)
            .or_else(|| self.descriptor_by_delete_file(file_name))
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    entities: Vec<RegistryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryEntry {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    insert_file_mask: Option<String>,
    #[serde(default)]
    delete_file_mask: Option<String>,
    #[serde(default = "default_partitions")]
    partitions: u32,
    #[serde(default)]
    binding: Option<String>,
    #[serde(default)]
    fields: Vec<EntityField>,
}

fn default_partitions() -> u32 {
    1
}

/// [`EntityManager`] backed by a JSON registry document.
///
/// Descriptors keep registry order, which is also the order masks are tried in.
#[derive(Debug, Clone)]
pub struct RegistryEntityManager {
    descriptors: Vec<Arc<EntityDescriptor>>,
    bindings: BTreeMap<String, String>,
}

impl RegistryEntityManager {
    pub fn from_json(raw: &str) -> Result<Self> {
        let registry: RegistryFile = serde_json::from_str(raw)
            .map_err(|e| IngestError::Config(format!("invalid entity registry: {}", e)))?;

        let mut descriptors = Vec::with_capacity(registry.entities.len());
        let mut bindings = BTreeMap::new();
        let mut names = HashSet::new();

        for entry in registry.entities {
            let descriptor = EntityDescriptor::new(
                &entry.name,
                entry.insert_file_mask.as_deref(),
                entry.delete_file_mask.as_deref(),
                entry.partitions,
                entry.fields,
            )?
            .with_description(entry.description);

            if !names.insert(descriptor.name().to_string()) {
                return Err(IngestError::Config(format!(
                    "entity '{}' is registered twice",
                    descriptor.name()
                )));
            }
            if let Some(binding) = entry.binding.filter(|b| !b.trim().is_empty()) {
                bindings.insert(descriptor.name().to_string(), binding);
            }
            descriptors.push(Arc::new(descriptor));
        }

        Ok(Self {
            descriptors,
            bindings,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("cannot read entity registry {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_REGISTRY)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl EntityManager for RegistryEntityManager {
    fn descriptor_by_insert_file(&self, file_name: &str) -> Option<Arc<EntityDescriptor>> {
        self.descriptors.iter().find(|d| d.is_insert_file(file_name)).cloned()
    }

    fn descriptor_by_delete_file(&self, file_name: &str) -> Option<Arc<EntityDescriptor>> {
        self.descriptors.iter().find(|d| d.is_delete_file(file_name)).cloned()
    }

    fn binding_for(&self, descriptor: &EntityDescriptor) -> Option<String> {
        self.bindings.get(descriptor.name()).cloned()
    }

    fn descriptor_by_name(&self, name: &str) -> Option<Arc<EntityDescriptor>> {
        let name = normalize_name(name);
        self.descriptors.iter().find(|d| d.name() == name).cloned()
    }

    fn descriptors(&self) -> Vec<Arc<EntityDescriptor>> {
        self.descriptors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, primary: bool, indexed: bool) -> EntityField {
        EntityField {
            name: name.to_string(),
            field_type: FieldType::Int,
            length: None,
            nullable: false,
            primary,
            indexed,
        }
    }

    #[test]
    fn test_descriptor_invariants() {
        let ok = EntityDescriptor::new(
            "  Houses ",
            Some("AS_HOUSES_*_*.XML"),
            Some("AS_HOUSES_DEL_*_*.XML"),
            1,
            vec![field("id", true, false), field("objectid", false, true)],
        )
        .unwrap();
        assert_eq!(ok.name(), "houses");
        assert!(ok.is_insert_file("AS_HOUSES_20240101_1.XML"));
        assert!(ok.is_delete_file("AS_HOUSES_DEL_20240101_1.XML"));
        assert!(!ok.is_insert_file("AS_HOUSES_DEL_20240101_1.XML"));

        let duplicate =
            EntityDescriptor::new("x", None, None, 1, vec![field("id", true, false), field("ID", false, false)]);
        assert!(duplicate.unwrap_err().is_config());

        let primary_and_indexed = EntityDescriptor::new("x", None, None, 1, vec![field("id", true, true)]);
        assert!(primary_and_indexed.unwrap_err().is_config());
    }

    #[test]
    fn test_registry_lookup_and_bindings() {
        let manager = RegistryEntityManager::from_json(
            r#"{"entities": [
                {"name": "houses", "insertFileMask": "AS_HOUSES_*_*.XML",
                 "deleteFileMask": "AS_HOUSES_DEL_*_*.XML", "binding": "gar.houses"},
                {"name": "steads", "insertFileMask": "AS_STEADS_*_*.XML"}
            ]}"#,
        )
        .unwrap();

        let houses = manager.descriptor_for_file("as_houses_del_20240101_77.xml").unwrap();
        assert_eq!(houses.name(), "houses");
        assert_eq!(manager.binding_for(&houses).as_deref(), Some("gar.houses"));

        let steads = manager.descriptor_by_name(" STEADS").unwrap();
        assert_eq!(manager.binding_for(&steads), None);
        assert!(manager.descriptor_for_file("README.TXT").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let err = RegistryEntityManager::from_json(
            r#"{"entities": [{"name": "Houses"}, {"name": "houses "}]}"#,
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_builtin_registry_loads() {
        let manager = RegistryEntityManager::builtin().unwrap();
        assert!(!manager.is_empty());
        assert!(manager.descriptor_for_file("AS_ADDR_OBJ_20240101_0a1b.XML").is_some());
    }
}
