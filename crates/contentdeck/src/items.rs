//! YAML archive items.
//!
//! Each item is one YAML mapping under `data/archive/items/{id}.yml`. An
//! optional schema file adds per-field rules on top of the always-required
//! `id`, `title` and `date`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::content::{ContentClient, ContentError, Result, delete_message, update_message};
use crate::lock::{EditLockCoordinator, LockMetadata};

/// Directory holding one YAML file per item.
pub const ITEMS_DIR: &str = "data/archive/items";

/// Optional field rules.
pub const SCHEMA_PATH: &str = "data/archive/_schema.yml";

/// Optional alias table.
pub const ALIASES_PATH: &str = "data/archive/aliases.yml";

/// Fields every item must carry.
pub const REQUIRED_FIELDS: [&str; 3] = ["id", "title", "date"];

/// An archive item with its repository location.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Cache key: the `id` field, or the file name when the file has none.
    pub id: String,
    pub path: String,
    /// Blob sha; `None` until first saved.
    pub sha: Option<String>,
    pub fields: Mapping,
}

impl Item {
    /// A string field, if present and a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn title(&self) -> &str {
        self.str_field("title").unwrap_or_default()
    }

    /// Case-insensitive substring match over top-level string fields.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.fields
            .values()
            .filter_map(Value::as_str)
            .any(|v| v.to_lowercase().contains(&needle))
    }
}

/// Value type a schema rule can demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Array,
    Boolean,
    #[serde(other)]
    Unknown,
}

/// Rule for one field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldRule {
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "type")]
    pub kind: Option<FieldType>,
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<String>>,
}

/// Field rules keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub fields: BTreeMap<String, FieldRule>,
}

impl Schema {
    /// Parse a schema document. Entries that are not rule mappings are skipped.
    pub fn parse(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let raw: Option<BTreeMap<String, Value>> = serde_yaml::from_str(text)?;
        let mut fields = BTreeMap::new();
        for (name, rule) in raw.unwrap_or_default() {
            match serde_yaml::from_value::<FieldRule>(rule) {
                Ok(rule) => {
                    fields.insert(name, rule);
                }
                Err(e) => tracing::warn!(field = %name, error = %e, "Skipping invalid schema rule"),
            }
        }
        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Check an item's fields. Returns every problem found.
pub fn validate(fields: &Mapping, schema: &Schema) -> Vec<String> {
    let mut errors: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|f| !fields.get(**f).is_some_and(is_truthy))
        .map(|f| format!("Missing required field: {f}"))
        .collect();

    for (name, rule) in &schema.fields {
        let value = fields.get(name.as_str()).filter(|v| is_truthy(v));
        let Some(value) = value else {
            if rule.required && !REQUIRED_FIELDS.contains(&name.as_str()) {
                errors.push(format!("Missing required field: {name}"));
            }
            continue;
        };

        match rule.kind {
            Some(FieldType::String) => match value.as_str() {
                None => errors.push(format!("{name} must be a string")),
                Some(s) => {
                    if let Some(allowed) = &rule.allowed
                        && !allowed.iter().any(|a| a == s)
                    {
                        errors.push(format!("{name} must be one of: {}", allowed.join(", ")));
                    }
                }
            },
            Some(FieldType::Number) if !value.is_number() => {
                errors.push(format!("{name} must be a number"))
            }
            Some(FieldType::Array) if !value.is_sequence() => {
                errors.push(format!("{name} must be an array"))
            }
            Some(FieldType::Boolean) if !value.is_bool() => {
                errors.push(format!("{name} must be a boolean"))
            }
            _ => {}
        }
    }

    errors
}

/// Presence test used for required fields: null, false, zero and empty
/// strings count as missing.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(_) | Value::Mapping(_) => true,
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Counts from a full load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: usize,
}

#[derive(Default)]
struct ItemState {
    loaded: bool,
    items: BTreeMap<String, Item>,
    schema: Schema,
    aliases: Mapping,
}

/// Cached view of the item archive with locked, sha-checked writes.
pub struct ItemStore {
    client: ContentClient,
    locks: Arc<EditLockCoordinator>,
    state: Mutex<ItemState>,
}

impl ItemStore {
    pub fn new(client: ContentClient, locks: Arc<EditLockCoordinator>) -> Self {
        Self {
            client,
            locks,
            state: Mutex::new(ItemState::default()),
        }
    }

    /// Load schema, aliases and every item, replacing the cache.
    ///
    /// The schema and aliases are optional. A file that fails to load or parse
    /// is counted in [`LoadReport::failed`] and skipped.
    pub async fn load(&self) -> Result<LoadReport> {
        let schema = match self.client.get_file(SCHEMA_PATH).await {
            Ok(file) => Schema::parse(file.text()?).unwrap_or_else(|e| {
                tracing::warn!(
                    error = %e,
                    "Invalid item schema, validation limited to required fields"
                );
                Schema::default()
            }),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Item schema not found, validation limited to required fields"
                );
                Schema::default()
            }
        };

        let aliases = match self.client.get_file(ALIASES_PATH).await {
            Ok(file) => serde_yaml::from_str::<Option<Mapping>>(file.text()?)
                .ok()
                .flatten()
                .unwrap_or_default(),
            Err(e) => {
                tracing::debug!(error = %e, "No item aliases");
                Mapping::new()
            }
        };

        let entries = match self.client.list_directory(ITEMS_DIR).await {
            Ok(entries) => entries,
            Err(ContentError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut items = BTreeMap::new();
        let mut report = LoadReport::default();
        for entry in entries.iter().filter(|e| e.has_extension("yml")) {
            match self.load_item(&entry.path, &entry.name).await {
                Ok(item) => {
                    items.insert(item.id.clone(), item);
                    report.loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "Failed to load item");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(loaded = report.loaded, failed = report.failed, "Items loaded");
        *self.state() = ItemState {
            loaded: true,
            items,
            schema,
            aliases,
        };
        Ok(report)
    }

    async fn load_item(&self, path: &str, name: &str) -> Result<Item> {
        let file = self.client.get_file(path).await?;
        let fields: Mapping =
            serde_yaml::from_str(file.text()?).map_err(|e| ContentError::decode(path, e))?;
        let id = fields
            .get("id")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| name.to_string());
        Ok(Item {
            id,
            path: file.path,
            sha: Some(file.sha),
            fields,
        })
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if !self.state().loaded {
            self.load().await?;
        }
        Ok(())
    }

    /// Problems with `fields` under the loaded schema.
    pub fn validate(&self, fields: &Mapping) -> Vec<String> {
        validate(fields, &self.state().schema)
    }

    /// Validate and write an item, creating or updating
    /// `data/archive/items/{id}.yml`.
    ///
    /// The write holds the item's edit lock, and an update first checks that
    /// the remote sha still matches the cached one.
    pub async fn save(&self, fields: Mapping, editor: LockMetadata) -> Result<Item> {
        self.ensure_loaded().await?;

        let errors = self.validate(&fields);
        if !errors.is_empty() {
            return Err(ContentError::Validation(errors));
        }
        let Some(id) = fields.get("id").and_then(scalar_to_string) else {
            return Err(ContentError::Validation(vec!["id must be a scalar".to_string()]));
        };

        let path = format!("{ITEMS_DIR}/{id}.yml");
        let previous_sha = self.state().items.get(&id).and_then(|i| i.sha.clone());
        let yaml = serde_yaml::to_string(&fields).map_err(|e| ContentError::decode(&path, e))?;

        self.locks.start_edit(&path, editor)?;
        let written = async {
            if let Some(sha) = previous_sha.as_deref() {
                self.locks.validate_sha(&path, sha).await?;
            }
            self.client
                .put_file(&path, yaml.as_bytes(), previous_sha.as_deref(), &update_message(&path))
                .await
        }
        .await;
        self.locks.complete_edit(&path);
        let written = written?;

        let item = Item {
            id: id.clone(),
            path,
            sha: written.sha,
            fields,
        };
        self.state().items.insert(id, item.clone());
        tracing::info!(id = %item.id, "Item saved");
        Ok(item)
    }

    /// Delete an item by id.
    pub async fn delete(&self, id: &str, editor: LockMetadata) -> Result<()> {
        self.ensure_loaded().await?;

        let item = self.get(id).ok_or_else(|| ContentError::NotFound {
            path: format!("{ITEMS_DIR}/{id}.yml"),
        })?;
        let sha = item.sha.clone().unwrap_or_default();

        self.locks.start_edit(&item.path, editor)?;
        let deleted = self
            .client
            .delete_file(&item.path, &sha, &delete_message(&item.path))
            .await;
        self.locks.complete_edit(&item.path);
        deleted?;

        self.state().items.remove(id);
        tracing::info!(id, "Item deleted");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Item> {
        self.state().items.get(id).cloned()
    }

    /// Every cached item, ordered by id.
    pub fn all(&self) -> Vec<Item> {
        self.state().items.values().cloned().collect()
    }

    pub fn search(&self, query: &str) -> Vec<Item> {
        self.state()
            .items
            .values()
            .filter(|item| item.matches(query))
            .cloned()
            .collect()
    }

    pub fn schema(&self) -> Schema {
        self.state().schema.clone()
    }

    pub fn aliases(&self) -> Mapping {
        self.state().aliases.clone()
    }

    fn state(&self) -> MutexGuard<'_, ItemState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
