//! Field metadata: the per-entity table of searchable fields.
//!
//! A [`FieldMap`] maps an API field name (looked up case-insensitively) to the
//! entity column and its [`FieldKind`]. Maps are resolved from the entity's
//! `Column` definitions and may be refined by hand for columns whose semantic
//! type is not visible in the schema (application enums, JSON lists).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use sea_orm::sea_query::ColumnType;
use sea_orm::{ActiveEnum, ColumnTrait, EntityTrait, IdenStatic, Iterable, Value};

use crate::query::FieldKind;

/// One searchable field of entity `E`.
#[derive(Clone)]
pub struct Field<E: EntityTrait> {
    /// Declared name, as registered.
    pub name: String,
    pub col: E::Column,
    pub kind: FieldKind,
    /// The underlying column accepts `NULL`.
    pub nullable: bool,
    /// Allowed database values for `Enum` / `EnumList` fields.
    pub variants: Option<Arc<[Value]>>,
}

#[derive(Clone)]
#[must_use]
pub struct FieldMap<E: EntityTrait> {
    map: HashMap<String, Field<E>>,
}

impl<E: EntityTrait> Default for FieldMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityTrait> FieldMap<E> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Build a map from every column of `E` whose type has a [`FieldKind`].
    ///
    /// Columns with unsupported types are left out, so filters naming them
    /// fail as unknown fields. An entity without such columns yields an
    /// empty map.
    pub fn resolve() -> Self {
        let mut out = Self::new();
        for col in E::Column::iter() {
            let def = col.def();
            let ty = def.get_column_type();
            let Some(kind) = FieldKind::from_column_type(ty) else {
                continue;
            };
            let variants = match ty {
                ColumnType::Enum { variants, .. } => Some(
                    variants
                        .iter()
                        .map(|v| Value::from(v.to_string()))
                        .collect::<Arc<[Value]>>(),
                ),
                _ => None,
            };
            out.put(col.as_str(), col, kind, variants);
        }
        out
    }

    /// Register (or replace) a field with an explicit kind.
    pub fn insert(mut self, api_name: impl Into<String>, col: E::Column, kind: FieldKind) -> Self {
        self.put(&api_name.into(), col, kind, None);
        self
    }

    /// Register an enumeration field backed by the given database values.
    pub fn insert_enum<V>(
        mut self,
        api_name: impl Into<String>,
        col: E::Column,
        variants: impl IntoIterator<Item = V>,
    ) -> Self
    where
        V: Into<Value>,
    {
        let variants = variants.into_iter().map(Into::into).collect();
        self.put(&api_name.into(), col, FieldKind::Enum, Some(variants));
        self
    }

    /// Register a JSON list column whose elements are enumeration values.
    pub fn insert_enum_list<V>(
        mut self,
        api_name: impl Into<String>,
        col: E::Column,
        variants: impl IntoIterator<Item = V>,
    ) -> Self
    where
        V: Into<Value>,
    {
        let variants = variants.into_iter().map(Into::into).collect();
        self.put(&api_name.into(), col, FieldKind::EnumList, Some(variants));
        self
    }

    /// Register a column mapped through a `SeaORM` active enum.
    pub fn insert_active_enum<A>(self, api_name: impl Into<String>, col: E::Column) -> Self
    where
        A: ActiveEnum + Iterable,
    {
        self.insert_enum(api_name, col, A::iter().map(|v| v.into_value().into()))
    }

    /// Hide a field from filtering and sorting.
    pub fn remove(mut self, api_name: &str) -> Self {
        self.map.remove(&api_name.to_lowercase());
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field<E>> {
        self.map.get(&name.to_lowercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field<E>> {
        self.map.values()
    }

    fn put(
        &mut self,
        api_name: &str,
        col: E::Column,
        kind: FieldKind,
        variants: Option<Arc<[Value]>>,
    ) {
        self.map.insert(
            api_name.to_lowercase(),
            Field {
                name: api_name.to_owned(),
                col,
                kind,
                nullable: col.def().is_null(),
                variants,
            },
        );
    }
}

/// Entities that can be searched through the dynamic query compilers.
///
/// The default field map is resolved from the column definitions. Override
/// [`Searchable::field_map`] to register enums, JSON lists or to hide columns.
pub trait Searchable: EntityTrait + 'static {
    fn field_map() -> FieldMap<Self> {
        FieldMap::resolve()
    }
}

static FIELD_MAPS: LazyLock<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> =
    LazyLock::new(DashMap::new);

/// Field map of `E`, built on first use and shared afterwards.
pub fn field_map_of<E: Searchable>() -> Arc<FieldMap<E>> {
    let key = TypeId::of::<E>();
    if let Some(hit) = FIELD_MAPS.get(&key)
        && let Ok(map) = Arc::clone(hit.value()).downcast::<FieldMap<E>>()
    {
        return map;
    }
    let built = Arc::new(E::field_map());
    FIELD_MAPS.insert(key, Arc::clone(&built) as Arc<dyn Any + Send + Sync>);
    built
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    mod ent {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(table_name = "gadgets")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i32,
            pub label: String,
            pub weight: Option<f64>,
            pub payload: Vec<u8>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    #[test]
    fn resolves_supported_columns_and_unwraps_optionals() {
        let map = FieldMap::<ent::Entity>::resolve();
        assert_eq!(map.len(), 3);
        let weight = map.get("WEIGHT").expect("weight resolved");
        assert_eq!(weight.kind, FieldKind::F64);
        assert!(weight.nullable);
        assert!(!map.get("label").expect("label resolved").nullable);
        assert!(map.get("payload").is_none());
    }

    #[test]
    fn explicit_registration_overrides_and_hides() {
        let map = FieldMap::<ent::Entity>::resolve()
            .insert_enum("Label", ent::Column::Label, ["small", "large"])
            .remove("id");
        let label = map.get("label").expect("label registered");
        assert_eq!(label.kind, FieldKind::Enum);
        assert_eq!(label.name, "Label");
        assert_eq!(label.variants.as_deref().map(<[Value]>::len), Some(2));
        assert!(map.get("id").is_none());
    }

    #[test]
    fn empty_map_reports_every_field_unknown() {
        let map = FieldMap::<ent::Entity>::new();
        assert!(map.is_empty());
        assert!(map.get("label").is_none());
    }
}
