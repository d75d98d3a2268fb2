#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::time::Duration;

use sea_orm::ConnectionTrait;
use serde_json::json;
use storekit_db::{RetryCfg, StoreConfig, UnitOfWork};
use tokio_util::sync::CancellationToken;

pub mod person {
    use sea_orm::entity::prelude::*;
    use storekit_db::{FieldKind, FieldMap, Searchable};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "people")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: i64,
        pub name: String,
        pub age: Option<i32>,
        pub role: String,
        pub tags: Json,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl Searchable for Entity {
        fn field_map() -> FieldMap<Self> {
            FieldMap::resolve()
                .insert_enum("role", Column::Role, ["admin", "staff", "guest"])
                .insert("tags", Column::Tags, FieldKind::StringList)
        }
    }
}

const SCHEMA: &str = "CREATE TABLE people (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER NULL,
    role TEXT NOT NULL,
    tags TEXT NOT NULL
)";

/// A unit of work over a fresh in-memory database with the `people` table.
pub async fn unit_of_work() -> UnitOfWork {
    unit_of_work_with(CancellationToken::new()).await
}

/// [`unit_of_work`] stopped by `cancel`.
pub async fn unit_of_work_with(cancel: CancellationToken) -> UnitOfWork {
    let conn = storekit_db::connect(&StoreConfig::default()).await.unwrap();
    conn.execute_unprepared(SCHEMA).await.unwrap();
    UnitOfWork::builder()
        .connection(conn)
        .retry(RetryCfg {
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        })
        .cancellation(cancel)
        .build()
        .unwrap()
}

/// Person `id`: every tenth is an admin, the rest alternate staff/guest.
/// Every seventh has no age; multiples of five are tagged `vip`.
pub fn person(id: i64) -> person::Model {
    let role = match id {
        i if i % 10 == 0 => "admin",
        i if i % 2 == 0 => "staff",
        _ => "guest",
    };
    let tags = if id % 5 == 0 { json!(["vip", "early"]) } else { json!(["early"]) };
    person::Model {
        id,
        name: format!("person{id:03}"),
        age: (id % 7 != 0).then(|| i32::try_from(18 + id % 50).unwrap()),
        role: role.to_owned(),
        tags,
    }
}

/// `unit_of_work()` with persons `1..=n` saved.
pub async fn seeded(n: i64) -> UnitOfWork {
    let uow = unit_of_work().await;
    uow.repository::<person::Entity>()
        .unwrap()
        .insert_many((1..=n).map(person))
        .unwrap();
    uow.save_changes().await.unwrap();
    uow
}
