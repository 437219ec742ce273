//! Entity declarations and table descriptors.
//!
//! A record type declares its shape as an [`EntityDef`], either by hand or
//! through `#[derive(Entity)]`. [`EntityDescriptor::build`] validates that
//! declaration and resolves it into the ordered column list the rest of the
//! engine works with. Descriptors are cached per type for the life of the
//! process.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::Serialize;

use crate::error::{Result, SyncError};
use crate::mapping::{sql_type_for, ScalarType};

/// One declared field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as written in the type.
    pub name: String,
    /// Declared scalar kind.
    pub scalar: ScalarType,
    /// Column name override.
    pub column: Option<String>,
    /// SQL type override.
    pub sql_type: Option<String>,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether this field is excluded from mapping.
    pub ignored: bool,
}

impl FieldDef {
    /// Declares a field.
    #[must_use]
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
            column: None,
            sql_type: None,
            primary_key: false,
            ignored: false,
        }
    }

    /// Maps the field to a differently named column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    /// Forces the SQL type of the column.
    #[must_use]
    pub fn sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Excludes the field from mapping.
    #[must_use]
    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Column name this field resolves to.
    #[must_use]
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// The declared shape of a record type, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    /// The type's own name.
    pub name: String,
    /// Table name override.
    pub table: Option<String>,
    /// Fields in declaration order.
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    /// Starts a declaration for the type called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
        }
    }

    /// Maps the type to a differently named table.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Table name this declaration resolves to.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

/// A resolved column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// SQL type used in DDL and drift comparison.
    pub sql_type: String,
    /// Whether this column is the primary key.
    pub primary_key: bool,
}

/// The expected shape of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescriptor {
    entity: String,
    table: String,
    columns: Vec<ColumnDescriptor>,
    ignored_fields: Vec<String>,
}

impl EntityDescriptor {
    /// Validates a declaration and resolves it into a descriptor.
    ///
    /// Exactly one mapped field must be the primary key, and at least one
    /// field must be mapped.
    pub fn build(def: &EntityDef) -> Result<Self> {
        let table = def.table_name().trim();
        if table.is_empty() {
            return Err(SyncError::mapping(&def.name, "table name is empty"));
        }
        if !is_valid_identifier(table) {
            return Err(SyncError::mapping(
                &def.name,
                format!("table name '{table}' is not a valid identifier"),
            ));
        }

        let keys: Vec<&str> = def
            .fields
            .iter()
            .filter(|f| f.primary_key && !f.ignored)
            .map(|f| f.name.as_str())
            .collect();
        if keys.len() > 1 {
            return Err(SyncError::mapping(
                &def.name,
                format!(
                    "multiple primary keys declared ({}); composite keys are not supported",
                    keys.join(", ")
                ),
            ));
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(def.fields.len());
        let mut ignored_fields = Vec::new();

        for field in &def.fields {
            if field.ignored {
                ignored_fields.push(field.name.clone());
                continue;
            }

            let name = field.column_name();
            if !is_valid_identifier(name) {
                return Err(SyncError::mapping(
                    &def.name,
                    format!("column name '{name}' is not a valid identifier"),
                ));
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(SyncError::mapping(
                    &def.name,
                    format!("column '{name}' is declared more than once"),
                ));
            }

            columns.push(ColumnDescriptor {
                name: name.to_string(),
                sql_type: sql_type_for(&field.scalar, field.sql_type.as_deref()),
                primary_key: field.primary_key,
            });
        }

        if columns.is_empty() {
            return Err(SyncError::mapping(&def.name, "no columns declared"));
        }
        if keys.is_empty() {
            return Err(SyncError::mapping(&def.name, "no primary key declared"));
        }

        Ok(Self {
            entity: def.name.clone(),
            table: table.to_string(),
            columns,
            ignored_fields,
        })
    }

    /// Name of the type this descriptor was built from.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Mapped columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Names of the fields excluded from mapping.
    #[must_use]
    pub fn ignored_fields(&self) -> &[String] {
        &self.ignored_fields
    }

    /// The primary key column.
    #[must_use]
    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Looks up a column by name, ignoring case.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Returns true if `name` may be interpolated into DDL as a bare identifier.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A record type that maps to a table.
///
/// Usually implemented with `#[derive(Entity)]`.
pub trait Entity: 'static {
    /// Declares the shape of this type.
    fn entity_def() -> EntityDef;
}

/// A record type registered for synchronization.
///
/// Submitted to `inventory` by `#[derive(Entity)]` and by
/// [`register!`](crate::register), so [`registered_entities`] can enumerate
/// every declared type linked into the binary.
#[derive(Debug, Clone, Copy)]
pub struct EntityRegistration {
    name: &'static str,
    type_id: fn() -> TypeId,
    def: fn() -> EntityDef,
}

impl EntityRegistration {
    /// Creates a registration for `T` under `name`.
    #[must_use]
    pub const fn of<T: Entity>(name: &'static str) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>,
            def: T::entity_def,
        }
    }

    /// Type name the entity was registered under.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Identity of the registered type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Produces the raw declaration.
    #[must_use]
    pub fn entity_def(&self) -> EntityDef {
        (self.def)()
    }

    /// Returns the cached descriptor, building it on first use.
    pub fn descriptor(&self) -> Result<Arc<EntityDescriptor>> {
        cached_descriptor(self.type_id(), || self.entity_def())
    }
}

inventory::collect!(EntityRegistration);

/// Every registered entity, ordered by name.
#[must_use]
pub fn registered_entities() -> Vec<&'static EntityRegistration> {
    let mut entities: Vec<&'static EntityRegistration> =
        inventory::iter::<EntityRegistration>.into_iter().collect();
    entities.sort_by_key(|e| e.name());
    entities
}

/// Returns the cached descriptor for `T`, building it on first use.
pub fn descriptor_of<T: Entity>() -> Result<Arc<EntityDescriptor>> {
    cached_descriptor(TypeId::of::<T>(), T::entity_def)
}

type DescriptorCache = RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>;

fn cache() -> &'static DescriptorCache {
    static CACHE: OnceLock<DescriptorCache> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn cached_descriptor(
    type_id: TypeId,
    def: impl FnOnce() -> EntityDef,
) -> Result<Arc<EntityDescriptor>> {
    if let Some(found) = cache()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&type_id)
    {
        return Ok(Arc::clone(found));
    }

    let built = Arc::new(EntityDescriptor::build(&def())?);
    let mut guard = cache().write().unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(guard.entry(type_id).or_insert(built)))
}

/// Registers a hand-written [`Entity`] implementation for synchronization.
///
/// ```rust,ignore
/// tablesync::register!(Person);
/// ```
#[macro_export]
macro_rules! register {
    ($ty:ty) => {
        $crate::inventory::submit! {
            $crate::entity::EntityRegistration::of::<$ty>(stringify!($ty))
        }
    };
}
