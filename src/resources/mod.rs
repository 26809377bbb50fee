//! # Resource Model
//!
//! Declarative descriptions of the resource types the API exposes, and the
//! per-run registry of instances created from them.
//!
//! A [`ResourceSpec`] names its collection endpoint, the fields a create
//! request carries and the other resource types it references. Instances are
//! keyed by [`InstanceKey`] so a run can hold more than one instance of a type
//! (the primary one shared by read-only cases, plus dedicated ones that a
//! case deletes or cancels).

mod catalog;

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::method::HttpMethod;
use crate::http::request::{ApiRequest, AuthRequirement, FilePart, RequestBody};

pub use catalog::builtin_catalog;

pub const PRIMARY_LABEL: &str = "primary";

/// Identifies one instance within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub resource: String,
    pub label: String,
}

impl InstanceKey {
    pub fn primary(resource: &str) -> Self {
        Self::labeled(resource, PRIMARY_LABEL)
    }

    pub fn labeled(resource: &str, label: &str) -> Self {
        Self {
            resource: resource.to_string(),
            label: label.to_string(),
        }
    }

    pub fn is_primary(&self) -> bool {
        self.label == PRIMARY_LABEL
    }

    /// Prefix of the run variables describing this instance: `agents` for
    /// the primary instance, `agents.doomed` otherwise.
    pub fn variable_prefix(&self) -> String {
        if self.is_primary() {
            self.resource.clone()
        } else {
            format!("{}.{}", self.resource, self.label)
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_primary() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}[{}]", self.resource, self.label)
        }
    }
}

/// Flavour of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextStyle {
    Word,
    Sentence,
    Paragraph,
    Company,
    Url,
    Semver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpec {
    pub style: TextStyle,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub max_len: Option<usize>,
}

impl TextSpec {
    pub fn new(style: TextStyle) -> Self {
        Self {
            style,
            prefix: None,
            suffix: None,
            max_len: None,
        }
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix.to_string());
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Text(TextSpec),
    Integer { min: i64, max: i64 },
    Number { min: f64, max: f64 },
    Boolean,
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Primitive(Primitive),
    /// Server id of an already-created instance of `resource`.
    Reference { resource: String },
    Enum(Vec<Value>),
    Object(Vec<FieldSpec>),
    List { item: Box<FieldKind>, len: usize },
}

impl FieldKind {
    pub fn text(style: TextStyle) -> Self {
        FieldKind::Primitive(Primitive::Text(TextSpec::new(style)))
    }

    pub fn styled(spec: TextSpec) -> Self {
        FieldKind::Primitive(Primitive::Text(spec))
    }

    pub fn literal(value: Value) -> Self {
        FieldKind::Primitive(Primitive::Literal(value))
    }

    pub fn reference(resource: &str) -> Self {
        FieldKind::Reference {
            resource: resource.to_string(),
        }
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        FieldKind::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn list(item: FieldKind, len: usize) -> Self {
        FieldKind::List {
            item: Box::new(item),
            len,
        }
    }

    /// Resource types referenced anywhere inside this kind.
    pub fn references(&self) -> Vec<&str> {
        match self {
            FieldKind::Reference { resource } => vec![resource.as_str()],
            FieldKind::Object(fields) => fields
                .iter()
                .flat_map(|field| field.kind.references())
                .collect(),
            FieldKind::List { item, .. } => item.references(),
            FieldKind::Primitive(_) | FieldKind::Enum(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Label-specific changes to a resource's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub label: String,
    /// Each replaces the base field of the same name.
    pub fields: Vec<FieldSpec>,
    pub csv: Option<CsvKind>,
}

/// Shape of the generated CSV attached to a multipart create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvKind {
    QuestionAnswer,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Multipart {
        file_field: String,
        file_name: String,
        csv: CsvKind,
        rows: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub type_name: String,
    /// Collection endpoint with a trailing slash, e.g. `/api/agents/`.
    pub collection_path: String,
    pub required_fields: Vec<FieldSpec>,
    pub optional_fields: Vec<FieldSpec>,
    pub depends_on: Vec<String>,
    pub encoding: Encoding,
    pub requires_auth: bool,
    pub variants: Vec<Variant>,
}

impl ResourceSpec {
    pub fn item_path(&self, id: &str) -> String {
        format!("{}{}", self.collection_path, id)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.required_fields.iter().chain(self.optional_fields.iter())
    }

    /// Declared dependencies plus every type a field references.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut found: Vec<&str> = self.depends_on.iter().map(String::as_str).collect();
        for target in self.fields().flat_map(|field| field.kind.references()) {
            if !found.contains(&target) {
                found.push(target);
            }
        }
        found
    }

    /// The spec an instance labelled `label` is generated from.
    pub fn for_label(&self, label: &str) -> Cow<'_, ResourceSpec> {
        let Some(variant) = self.variants.iter().find(|variant| variant.label == label) else {
            return Cow::Borrowed(self);
        };

        let mut spec = self.clone();
        for replacement in &variant.fields {
            let existing = spec
                .required_fields
                .iter_mut()
                .chain(spec.optional_fields.iter_mut())
                .find(|field| field.name == replacement.name);
            if let Some(existing) = existing {
                existing.kind = replacement.kind.clone();
            }
        }
        if let (Some(kind), Encoding::Multipart { csv, .. }) = (variant.csv, &mut spec.encoding) {
            *csv = kind;
        }
        Cow::Owned(spec)
    }

    fn auth(&self) -> AuthRequirement {
        if self.requires_auth {
            AuthRequirement::Required
        } else {
            AuthRequirement::Optional
        }
    }

    /// Builds the create request for a generated payload.
    pub fn create_request(&self, payload: &Payload) -> ApiRequest {
        let body = match (&self.encoding, &payload.upload) {
            (Encoding::Multipart { file_field, file_name, .. }, Some(content)) => {
                RequestBody::Multipart {
                    fields: form_fields(&payload.body),
                    file: FilePart {
                        field: file_field.clone(),
                        file_name: file_name.clone(),
                        content_type: "text/csv".to_string(),
                        content: content.clone(),
                    },
                }
            }
            _ => RequestBody::Json(payload.body.clone()),
        };

        ApiRequest::new(HttpMethod::Post, &self.collection_path)
            .with_body(body)
            .with_auth(self.auth())
    }

    pub fn delete_request(&self, id: &str) -> ApiRequest {
        ApiRequest::new(HttpMethod::Delete, &self.item_path(id)).with_auth(self.auth())
    }
}

/// Multipart form fields are sent as text.
fn form_fields(body: &Value) -> Vec<(String, String)> {
    body.as_object()
        .map(|fields| {
            fields
                .iter()
                .map(|(name, value)| {
                    let text = match value {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    };
                    (name.clone(), text)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Generated create payload. `upload` holds the CSV for multipart resources.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub body: Value,
    pub upload: Option<String>,
}

/// Every resource type known to a run, in declaration order.
#[derive(Debug, Clone)]
pub struct ResourceCatalog {
    specs: Vec<ResourceSpec>,
}

impl ResourceCatalog {
    pub fn get(&self, type_name: &str) -> Option<&ResourceSpec> {
        self.specs.iter().find(|spec| spec.type_name == type_name)
    }

    pub fn index_of(&self, type_name: &str) -> Option<usize> {
        self.specs
            .iter()
            .position(|spec| spec.type_name == type_name)
    }

    pub fn specs(&self) -> &[ResourceSpec] {
        &self.specs
    }
}

impl FromIterator<ResourceSpec> for ResourceCatalog {
    fn from_iter<I: IntoIterator<Item = ResourceSpec>>(specs: I) -> Self {
        Self {
            specs: specs.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Pending,
    Created,
    Failed,
    Destroyed,
}

#[derive(Debug, Clone)]
pub struct GeneratedInstance {
    pub key: InstanceKey,
    pub id: Option<String>,
    pub status: InstanceStatus,
}

impl GeneratedInstance {
    pub fn pending(key: InstanceKey) -> Self {
        Self {
            key,
            id: None,
            status: InstanceStatus::Pending,
        }
    }

    pub fn created_id(&self) -> Option<&str> {
        match self.status {
            InstanceStatus::Created => self.id.as_deref(),
            _ => None,
        }
    }
}

/// Instances of one run in creation order.
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: Vec<GeneratedInstance>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: GeneratedInstance) {
        self.instances.push(instance);
    }

    pub fn get(&self, key: &InstanceKey) -> Option<&GeneratedInstance> {
        self.instances.iter().find(|instance| &instance.key == key)
    }

    /// The first created instance of a type; the primary one when it exists.
    pub fn first_created(&self, resource: &str) -> Option<&GeneratedInstance> {
        let mut created = self
            .instances
            .iter()
            .filter(|instance| instance.key.resource == resource && instance.created_id().is_some());
        let first = created.next()?;
        if first.key.is_primary() {
            return Some(first);
        }
        created
            .find(|instance| instance.key.is_primary())
            .or(Some(first))
    }

    pub fn mark_created(&mut self, key: &InstanceKey, id: String) {
        if let Some(instance) = self.get_mut(key) {
            instance.id = Some(id);
            instance.status = InstanceStatus::Created;
        }
    }

    pub fn mark_failed(&mut self, key: &InstanceKey) {
        if let Some(instance) = self.get_mut(key) {
            instance.status = InstanceStatus::Failed;
        }
    }

    pub fn mark_destroyed(&mut self, key: &InstanceKey) {
        if let Some(instance) = self.get_mut(key) {
            instance.status = InstanceStatus::Destroyed;
        }
    }

    /// Created instances, most recently created first.
    pub fn teardown_order(&self) -> Vec<&GeneratedInstance> {
        self.instances
            .iter()
            .rev()
            .filter(|instance| instance.status == InstanceStatus::Created)
            .collect()
    }

    fn get_mut(&mut self, key: &InstanceKey) -> Option<&mut GeneratedInstance> {
        self.instances
            .iter_mut()
            .find(|instance| &instance.key == key)
    }
}
