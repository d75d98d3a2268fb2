//! Sort keys → `ORDER BY`.

use sea_orm::sea_query::Order;
use sea_orm::{EntityTrait, QueryOrder, Select};

use crate::query::validate::{ValidationErrors, ValidationFailure};
use crate::query::{FieldMap, SortDirection, SortOrder};

const fn to_order(dir: SortDirection) -> Order {
    match dir {
        SortDirection::Descending => Order::Desc,
        SortDirection::Ascending => Order::Asc,
    }
}

/// Apply [`SortOrder`]s in list order: the first is the primary key, each
/// following entry breaks ties of the ones before it.
pub trait SortExt<E: EntityTrait>: Sized {
    /// Unknown fields are skipped.
    #[must_use]
    fn apply_sorts(self, sorts: &[SortOrder], fmap: &FieldMap<E>) -> Self;

    /// Unknown fields fail the whole ordering.
    ///
    /// # Errors
    /// Returns `ValidationErrors` naming every unknown sort field.
    fn try_apply_sorts(
        self,
        sorts: &[SortOrder],
        fmap: &FieldMap<E>,
    ) -> Result<Self, ValidationErrors>;
}

impl<E: EntityTrait> SortExt<E> for Select<E> {
    fn apply_sorts(self, sorts: &[SortOrder], fmap: &FieldMap<E>) -> Self {
        let mut query = self;
        for key in sorts {
            if let Some(field) = fmap.get(&key.field_name) {
                query = query.order_by(field.col, to_order(key.direction));
            } else {
                tracing::debug!(field = %key.field_name, "dropping unknown sort key");
            }
        }
        query
    }

    fn try_apply_sorts(
        self,
        sorts: &[SortOrder],
        fmap: &FieldMap<E>,
    ) -> Result<Self, ValidationErrors> {
        let failures: Vec<_> = sorts
            .iter()
            .enumerate()
            .filter(|(_, key)| fmap.get(&key.field_name).is_none())
            .map(|(i, key)| ValidationFailure::unknown_sort(i, &key.field_name))
            .collect();
        if !failures.is_empty() {
            return Err(ValidationErrors::new(failures));
        }
        Ok(self.apply_sorts(sorts, fmap))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    mod ent {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "songs")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub title: String,
            pub year: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    fn sql(select: Select<ent::Entity>) -> String {
        select.build(DbBackend::Sqlite).to_string()
    }

    #[test]
    fn empty_sorts_leave_query_untouched() {
        let fm = FieldMap::resolve();
        let out = sql(ent::Entity::find().apply_sorts(&[], &fm));
        assert!(!out.contains("ORDER BY"), "{out}");
    }

    #[test]
    fn keys_apply_in_list_order() {
        let fm = FieldMap::resolve();
        let sorts = [SortOrder::desc("Year"), SortOrder::asc("title")];
        let out = sql(ent::Entity::find().apply_sorts(&sorts, &fm));
        assert!(
            out.ends_with(r#"ORDER BY "songs"."year" DESC, "songs"."title" ASC"#),
            "{out}"
        );
    }

    #[test]
    fn unknown_keys_skipped_or_reported() {
        let fm = FieldMap::resolve();
        let sorts = [SortOrder::asc("rating"), SortOrder::asc("id")];
        let out = sql(ent::Entity::find().apply_sorts(&sorts, &fm));
        assert!(out.ends_with(r#"ORDER BY "songs"."id" ASC"#), "{out}");

        let err = ent::Entity::find().try_apply_sorts(&sorts, &fm).unwrap_err();
        assert_eq!(err.failures()[0].message, "SortBy 'rating' is not valid.");
    }
}
