#![allow(dead_code)]

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use wt_cache::prelude::*;

pub mod user {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, Default, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id:         i32,
        #[sea_orm(unique)]
        pub name:       String,
        pub age:        i32,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

mod migrations {
    use sea_orm_migration::prelude::*;

    pub struct Migrator;

    impl MigratorTrait for Migrator {
        fn migrations() -> Vec<Box<dyn MigrationTrait>> {
            vec![Box::new(Migration)]
        }
    }

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "users_migration"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).integer().not_null().primary_key())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Age).integer().not_null().default(0))
                        .col(ColumnDef::new(Users::CreatedAt).big_integer().not_null().default(0))
                        .col(ColumnDef::new(Users::UpdatedAt).big_integer().not_null().default(0))
                        .index(Index::create().name("idx-unique-name").col(Users::Name).unique())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager.drop_table(Table::drop().table(Users::Table).to_owned()).await
        }
    }

    #[derive(Iden)]
    pub enum Users {
        Table,
        Id,
        Name,
        Age,
        CreatedAt,
        UpdatedAt,
    }
}

#[derive(Debug, Default)]
pub struct UserController;

impl EntityController for UserController {
    type Entity = user::Entity;
    type Key = i32;

    fn key_of(&self, model: &user::Model) -> i32 {
        model.id
    }

    fn timestamp_columns(&self) -> Option<TimestampColumns<user::Column>> {
        Some(TimestampColumns {
            created_at: user::Column::CreatedAt,
            updated_at: user::Column::UpdatedAt,
        })
    }
}

/// Records what the gateway and the cache report. Can cancel a context when a given statement is about to be sent.
#[derive(Default)]
pub struct Recorder {
    statements:    Mutex<Vec<Statement>>,
    reloads:       AtomicUsize,
    invalidations: AtomicUsize,
    trap:          Mutex<Option<(Statement, Context)>>,
}

impl Recorder {
    pub fn count(&self, statement: Statement) -> usize {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == statement)
            .count()
    }

    pub fn total(&self) -> usize {
        self.statements.lock().unwrap().len()
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.statements.lock().unwrap().clear();
        self.reloads.store(0, Ordering::SeqCst);
        self.invalidations.store(0, Ordering::SeqCst);
    }

    /// Cancel `ctx` right before the next `statement` is sent.
    pub fn cancel_on(&self, statement: Statement, ctx: &Context) {
        *self.trap.lock().unwrap() = Some((statement, ctx.clone()));
    }
}

impl Observer for Recorder {
    fn on_statement(&self, statement: Statement) {
        self.statements.lock().unwrap().push(statement);
        let mut trap = self.trap.lock().unwrap();
        if trap.as_ref().is_some_and(|(s, _)| *s == statement) {
            if let Some((_, ctx)) = trap.take() {
                ctx.cancel();
            }
        }
    }

    fn on_reload(&self, _rows: usize) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }

    fn on_invalidate(&self, _error: &Error) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Fixture {
    pub db:       DatabaseConnection,
    pub recorder: Arc<Recorder>,
    _dir:         tempfile::TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::Builder::new().prefix("wt-cache-test").tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("test.sqlite").display().to_string());
        let driver = wt_cache::driver::connect(&config).await.unwrap();
        let db = driver.connection();
        migrations::Migrator::up(&db, None).await.unwrap();

        Self {
            db,
            recorder: Arc::new(Recorder::default()),
            _dir: dir,
        }
    }

    pub fn gateway(&self) -> Gateway<user::Entity> {
        Gateway::new(self.db.clone()).with_observer(self.recorder.clone())
    }

    pub fn repository(&self) -> Repository<UserController> {
        Repository::new(Arc::new(UserController), self.db.clone()).with_observer(self.recorder.clone())
    }

    pub fn cache(&self, enabled: bool) -> EntityCache<UserController> {
        EntityCache::builder()
            .controller(UserController)
            .repository(self.repository())
            .enabled(enabled)
            .build()
            .unwrap()
    }

    /// Insert rows bypassing the observer.
    pub async fn seed(&self, users: impl IntoIterator<Item = user::Model>) {
        let gateway = Gateway::<user::Entity>::new(self.db.clone());
        for u in users {
            gateway.create(u).await.unwrap();
        }
    }
}

pub fn user(id: i32, name: &str) -> user::Model {
    user::Model {
        id,
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn aged(id: i32, name: &str, age: i32) -> user::Model {
    user::Model {
        age,
        ..user(id, name)
    }
}
