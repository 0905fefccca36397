//! Schema-typed entities and the durable entity store port.
//!
//! Entities are grouped by kind. A [`Schema`] declares the typed properties of
//! a kind and whether each one is indexed; entities are built through the
//! schema so the store never sees an undeclared or mistyped property.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{EntityError, EntityResult};

/// Entity key: kind plus a caller-chosen name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub kind: String,
    pub name: String,
}

impl Key {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Type of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Timestamp,
    Integer,
    Boolean,
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Timestamp(DateTime<Utc>),
    Integer(i64),
    Boolean(bool),
    Null,
}

impl Value {
    /// Kind of this value; `None` for null.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::String(_) => Some(ValueKind::String),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
            Value::Integer(_) => Some(ValueKind::Integer),
            Value::Boolean(_) => Some(ValueKind::Boolean),
            Value::Null => None,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

/// A stored property: value plus its index flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub value: Value,
    pub indexed: bool,
}

/// An entity: key plus named properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: Key,
    pub properties: BTreeMap<String, Property>,
}

impl Entity {
    /// Create an entity with no properties.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
        }
    }

    /// Add or replace a property.
    pub fn with_property(mut self, name: impl Into<String>, value: Value, indexed: bool) -> Self {
        self.properties
            .insert(name.into(), Property { value, indexed });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).map(|p| &p.value)
    }

    /// String property, if present and a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Timestamp property, if present and a timestamp.
    pub fn get_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name) {
            Some(Value::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }
}

/// Declared property of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: ValueKind,
    pub indexed: bool,
}

/// Typed property declaration for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    kind: String,
    properties: Vec<PropertyDef>,
}

impl Schema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: Vec::new(),
        }
    }

    /// Declare a string property.
    pub fn add_string(self, name: impl Into<String>, indexed: bool) -> Self {
        self.add(name, ValueKind::String, indexed)
    }

    /// Declare an indexed timestamp property.
    pub fn add_datetime(self, name: impl Into<String>) -> Self {
        self.add(name, ValueKind::Timestamp, true)
    }

    /// Declare an indexed integer property.
    pub fn add_integer(self, name: impl Into<String>) -> Self {
        self.add(name, ValueKind::Integer, true)
    }

    fn add(mut self, name: impl Into<String>, kind: ValueKind, indexed: bool) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            kind,
            indexed,
        });
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Key of this kind with the given name.
    pub fn key(&self, name: impl Into<String>) -> Key {
        Key::new(&self.kind, name)
    }

    /// Build an entity of this kind, checking every value against its
    /// declaration. Undeclared properties are rejected; nulls are allowed.
    pub fn create_entity<I, N>(&self, name: impl Into<String>, values: I) -> EntityResult<Entity>
    where
        I: IntoIterator<Item = (N, Value)>,
        N: Into<String>,
    {
        let mut entity = Entity::new(self.key(name));
        for (prop, value) in values {
            let prop = prop.into();
            let def = self
                .properties
                .iter()
                .find(|d| d.name == prop)
                .ok_or_else(|| {
                    EntityError::Schema(format!("'{}' is not a property of '{}'", prop, self.kind))
                })?;
            if let Some(kind) = value.kind()
                && kind != def.kind
            {
                return Err(EntityError::Schema(format!(
                    "property '{}' of '{}' expects {:?}, got {:?}",
                    prop, self.kind, def.kind, kind
                )));
            }
            entity = entity.with_property(prop, value, def.indexed);
        }
        Ok(entity)
    }
}

/// Schema of the `sessions` kind: unindexed `data` payload and an indexed
/// `lastaccess` timestamp.
pub fn session_schema() -> Schema {
    Schema::new(crate::store::SESSION_KIND)
        .add_string("data", false)
        .add_datetime("lastaccess")
}

/// Comparison operator of a property filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
}

impl FilterOp {
    /// Whether `lhs op rhs` holds. Values of different kinds never match.
    pub fn matches(self, lhs: &Value, rhs: &Value) -> bool {
        let Some(ord) = lhs.partial_cmp(rhs) else {
            return false;
        };
        match self {
            FilterOp::LessThan => ord == Ordering::Less,
            FilterOp::LessThanOrEqual => ord != Ordering::Greater,
            FilterOp::GreaterThan => ord == Ordering::Greater,
            FilterOp::GreaterThanOrEqual => ord != Ordering::Less,
            FilterOp::Equal => ord == Ordering::Equal,
        }
    }
}

/// `property op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub property: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Query over one kind; all filters must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub kind: String,
    pub filters: Vec<PropertyFilter>,
    /// Return keys only; matched entities come back without properties.
    pub keys_only: bool,
}

impl Query {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filters: Vec::new(),
            keys_only: false,
        }
    }

    /// Only fetch the keys of matching entities.
    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// Add a filter.
    pub fn filter(mut self, property: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(PropertyFilter {
            property: property.into(),
            op,
            value,
        });
        self
    }

    /// Whether an entity satisfies this query.
    pub fn matches(&self, entity: &Entity) -> bool {
        entity.key.kind == self.kind
            && self.filters.iter().all(|f| {
                entity
                    .get(&f.property)
                    .is_some_and(|v| f.op.matches(v, &f.value))
            })
    }
}

/// Durable, schema-typed entity store.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch one entity by key. `Ok(None)` when it does not exist.
    async fn fetch_by_key(&self, key: &Key) -> EntityResult<Option<Entity>>;

    /// Insert or replace an entity.
    async fn upsert(&self, entity: &Entity) -> EntityResult<()>;

    /// Delete entities by key. Missing keys are not an error.
    async fn delete(&self, keys: &[Key]) -> EntityResult<()>;

    /// All entities matching a query.
    async fn query(&self, query: &Query) -> EntityResult<Vec<Entity>>;
}

/// Shared entity store handle.
pub type SharedEntityStore = Arc<dyn EntityStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_schema_builds_entity() {
        let schema = session_schema();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entity = schema
            .create_entity(
                "abc",
                [("data", Value::from("payload")), ("lastaccess", Value::from(now))],
            )
            .unwrap();

        assert_eq!(entity.key, Key::new("sessions", "abc"));
        assert_eq!(entity.get_str("data"), Some("payload"));
        assert_eq!(entity.get_timestamp("lastaccess"), Some(now));
        assert!(!entity.properties["data"].indexed);
        assert!(entity.properties["lastaccess"].indexed);
    }

    #[test]
    fn test_schema_rejects_unknown_property() {
        let err = session_schema()
            .create_entity("abc", [("color", Value::from("red"))])
            .unwrap_err();
        assert!(matches!(err, EntityError::Schema(_)));
    }

    #[test]
    fn test_schema_rejects_wrong_type() {
        let err = session_schema()
            .create_entity("abc", [("lastaccess", Value::from("yesterday"))])
            .unwrap_err();
        assert!(matches!(err, EntityError::Schema(_)));
    }

    #[test]
    fn test_filter_ops() {
        let a = Value::Integer(1);
        let b = Value::Integer(2);
        assert!(FilterOp::LessThan.matches(&a, &b));
        assert!(!FilterOp::LessThan.matches(&b, &b));
        assert!(FilterOp::LessThanOrEqual.matches(&b, &b));
        assert!(FilterOp::GreaterThan.matches(&b, &a));
        assert!(FilterOp::GreaterThanOrEqual.matches(&a, &a));
        assert!(FilterOp::Equal.matches(&a, &a));
        // Mixed kinds never match.
        assert!(!FilterOp::Equal.matches(&a, &Value::from("1")));
    }

    #[test]
    fn test_query_matches_kind_and_filters() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let entity = session_schema()
            .create_entity("x", [("lastaccess", Value::from(t0))])
            .unwrap();

        let query = Query::kind("sessions").filter("lastaccess", FilterOp::LessThan, t1.into());
        assert!(query.matches(&entity));

        let other_kind = Query::kind("users");
        assert!(!other_kind.matches(&entity));

        let missing_prop =
            Query::kind("sessions").filter("data", FilterOp::Equal, Value::from("x"));
        assert!(!missing_prop.matches(&entity));
    }
}
