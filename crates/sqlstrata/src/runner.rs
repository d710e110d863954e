//! Orchestration of migration runs.
//!
//! The [`Runner`] drives a run through its phases: take the registered
//! migrations, filter them by profile and tags, diff against the ledger,
//! then apply the pending set in version order with one transaction per
//! migration. A run holds an advisory lock row for its duration so two
//! processes cannot apply migrations concurrently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};
use crate::expression::Expression;
use crate::processor::Processor;
use crate::version_store::{quote_table, VersionStore};

/// The materialized change lists of one migration.
pub struct MigrationScript {
    /// Expressions applied when migrating up, in order.
    pub up: Vec<Expression>,
    /// Expressions applied when migrating down, in order.
    pub down: Vec<Expression>,
}

/// A versioned migration with `up` and `down` expression lists.
///
/// Implementors declare their identity through associated consts and build
/// their expression lists in `up`/`down`. Register with
/// [`MigrationRegistry::register_migration`].
pub trait Migration {
    /// Strictly-ordered version. Monotonic integers and timestamps both work.
    const VERSION: i64;
    /// Free-text description recorded in the ledger.
    const DESCRIPTION: &'static str;
    /// Restricts the migration to runs requesting this profile.
    const PROFILE: Option<&'static str> = None;
    /// Labels for selective filtering.
    const TAGS: &'static [&'static str] = &[];
    /// Maintenance migrations run on every invocation and are never
    /// recorded in the ledger.
    const MAINTENANCE: bool = false;

    /// Builds the up expression list.
    fn up() -> Vec<Expression>;

    /// Builds the down expression list. Empty by default, which makes the
    /// migration irreversible.
    fn down() -> Vec<Expression> {
        Vec::new()
    }
}

type MigrationFactory = Box<dyn Fn() -> MigrationScript + Send + Sync>;

/// A migration descriptor held by the registry.
///
/// The factory is lazy: expression lists are materialized only for
/// migrations actually selected by a run.
pub struct RegisteredMigration {
    /// Strictly-ordered version.
    pub version: i64,
    /// Free-text description recorded in the ledger.
    pub description: String,
    /// Restricts the migration to runs requesting this profile.
    pub profile: Option<String>,
    /// Labels for selective filtering.
    pub tags: Vec<String>,
    /// Whether this runs on every invocation, outside version tracking.
    pub maintenance: bool,
    factory: MigrationFactory,
}

impl RegisteredMigration {
    /// Creates a descriptor from a version, description and script factory.
    pub fn new(
        version: i64,
        description: impl Into<String>,
        factory: impl Fn() -> MigrationScript + Send + Sync + 'static,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            profile: None,
            tags: Vec::new(),
            maintenance: false,
            factory: Box::new(factory),
        }
    }

    /// Creates a descriptor from a [`Migration`] implementor.
    #[must_use]
    pub fn from_migration<M: Migration + 'static>() -> Self {
        Self {
            version: M::VERSION,
            description: M::DESCRIPTION.to_string(),
            profile: M::PROFILE.map(str::to_string),
            tags: M::TAGS.iter().map(|tag| (*tag).to_string()).collect(),
            maintenance: M::MAINTENANCE,
            factory: Box::new(|| MigrationScript {
                up: M::up(),
                down: M::down(),
            }),
        }
    }

    /// Restricts the migration to the given profile.
    #[must_use]
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Adds a filtering tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Marks the migration as maintenance.
    #[must_use]
    pub fn maintenance(mut self) -> Self {
        self.maintenance = true;
        self
    }

    fn script(&self) -> MigrationScript {
        (self.factory)()
    }
}

/// Ordered container of migration descriptors, populated at startup.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: Vec<RegisteredMigration>,
}

impl MigrationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a migration descriptor.
    pub fn register(&mut self, migration: RegisteredMigration) {
        self.migrations.push(migration);
    }

    /// Adds a [`Migration`] implementor.
    pub fn register_migration<M: Migration + 'static>(&mut self) {
        self.register(RegisteredMigration::from_migration::<M>());
    }

    /// Returns the registered descriptors in registration order.
    #[must_use]
    pub fn migrations(&self) -> &[RegisteredMigration] {
        &self.migrations
    }

    /// Number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Observable phase of the current or last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// No run started yet.
    Idle,
    /// Collecting candidates from the registry.
    Discovering,
    /// Applying profile and tag filters.
    Filtering,
    /// Diffing candidates against the ledger.
    Diffing,
    /// Executing the pending set.
    Applying,
    /// The last run finished successfully.
    Completed,
    /// The last run stopped on an error.
    Aborted,
}

/// One row of the merged registry/ledger view.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Migration version.
    pub version: i64,
    /// Description from the registry, or the ledger for orphaned rows.
    pub description: String,
    /// When the migration was applied, `None` if pending.
    pub applied_on: Option<DateTime<Utc>>,
    /// Profile restriction, if any.
    pub profile: Option<String>,
    /// Filtering tags.
    pub tags: Vec<String>,
    /// Whether this is a maintenance migration.
    pub maintenance: bool,
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

struct PlannedStep {
    version: i64,
    description: String,
    expressions: Vec<Expression>,
    record: bool,
}

/// Drives migration runs against one database with one dialect.
pub struct Runner {
    registry: MigrationRegistry,
    dialect: Box<dyn Dialect>,
    processor: Processor,
    store: VersionStore,
    state: RunnerState,
    profile: Option<String>,
    tags: Vec<String>,
}

impl Runner {
    /// Creates a runner over a processor, a dialect and a registry.
    #[must_use]
    pub fn new(
        processor: Processor,
        dialect: Box<dyn Dialect>,
        registry: MigrationRegistry,
    ) -> Self {
        Self {
            registry,
            dialect,
            processor,
            store: VersionStore::new(),
            state: RunnerState::Idle,
            profile: None,
            tags: Vec::new(),
        }
    }

    /// Uses a custom version store.
    #[must_use]
    pub fn with_version_store(mut self, store: VersionStore) -> Self {
        self.store = store;
        self
    }

    /// Requests a profile; profiled migrations run only when selected.
    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Requests tags; when non-empty, only migrations with an intersecting
    /// tag set run.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Returns the phase of the current or last run.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Returns the processor, e.g. to read the preview transcript.
    #[must_use]
    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Applies all pending migrations ascending, up to and including
    /// `target` when given, then runs maintenance migrations.
    pub async fn migrate_up(&mut self, target: Option<i64>) -> Result<()> {
        match self.run_up(target).await {
            Ok(()) => {
                self.state = RunnerState::Completed;
                Ok(())
            }
            Err(err) => {
                self.state = RunnerState::Aborted;
                Err(err)
            }
        }
    }

    /// Reverts applied migrations with versions above `target`, descending.
    /// The target version itself stays applied.
    pub async fn migrate_down(&mut self, target: i64) -> Result<()> {
        match self.run_down(target).await {
            Ok(()) => {
                self.state = RunnerState::Completed;
                Ok(())
            }
            Err(err) => {
                self.state = RunnerState::Aborted;
                Err(err)
            }
        }
    }

    /// Reverts the last `count` applied migrations.
    pub async fn rollback_last(&mut self, count: usize) -> Result<()> {
        let applied: Vec<i64> = self
            .store
            .applied_versions(&mut self.processor)
            .await?
            .into_iter()
            .collect();
        let target = if count >= applied.len() {
            i64::MIN
        } else {
            applied[applied.len() - count - 1]
        };
        self.migrate_down(target).await
    }

    /// Returns the merged view of registry and ledger, ascending by version.
    pub async fn list_migrations(&mut self) -> Result<Vec<MigrationStatus>> {
        let mut statuses: BTreeMap<i64, MigrationStatus> = self
            .registry
            .migrations()
            .iter()
            .map(|migration| {
                (
                    migration.version,
                    MigrationStatus {
                        version: migration.version,
                        description: migration.description.clone(),
                        applied_on: None,
                        profile: migration.profile.clone(),
                        tags: migration.tags.clone(),
                        maintenance: migration.maintenance,
                    },
                )
            })
            .collect();

        for record in self.store.applied_records(&mut self.processor).await? {
            statuses
                .entry(record.version)
                .or_insert_with(|| MigrationStatus {
                    version: record.version,
                    description: record.description.clone(),
                    applied_on: None,
                    profile: None,
                    tags: Vec::new(),
                    maintenance: false,
                })
                .applied_on = Some(record.applied_on);
        }

        Ok(statuses.into_values().collect())
    }

    /// Renders the merged registry/ledger view as pretty-printed JSON.
    pub async fn list_migrations_json(&mut self) -> Result<String> {
        let statuses = self.list_migrations().await?;
        Ok(serde_json::to_string_pretty(&statuses)?)
    }

    async fn run_up(&mut self, target: Option<i64>) -> Result<()> {
        self.state = RunnerState::Discovering;
        self.state = RunnerState::Filtering;
        let selected = self.filtered_indices();
        self.check_version_conflicts(&selected)?;

        self.store.ensure_schema(&mut self.processor).await?;
        self.acquire_lock().await?;
        let outcome = self.run_up_locked(&selected, target).await;
        self.finish_locked(outcome).await
    }

    async fn run_up_locked(&mut self, selected: &[usize], target: Option<i64>) -> Result<()> {
        self.state = RunnerState::Diffing;
        let applied = self.store.applied_versions(&mut self.processor).await?;

        let mut pending: Vec<usize> = selected
            .iter()
            .copied()
            .filter(|&index| {
                let migration = &self.registry.migrations()[index];
                if migration.maintenance {
                    return false;
                }
                if applied.contains(&migration.version) {
                    return false;
                }
                target.map_or(true, |limit| migration.version <= limit)
            })
            .collect();
        pending.sort_by_key(|&index| self.registry.migrations()[index].version);

        let mut plan: Vec<PlannedStep> = pending
            .iter()
            .map(|&index| {
                let migration = &self.registry.migrations()[index];
                PlannedStep {
                    version: migration.version,
                    description: migration.description.clone(),
                    expressions: migration.script().up,
                    record: true,
                }
            })
            .collect();

        // Maintenance migrations run after the tracked set, every invocation.
        for &index in selected {
            let migration = &self.registry.migrations()[index];
            if migration.maintenance {
                plan.push(PlannedStep {
                    version: migration.version,
                    description: migration.description.clone(),
                    expressions: migration.script().up,
                    record: false,
                });
            }
        }

        if plan.is_empty() {
            info!("no pending migrations");
        }

        self.state = RunnerState::Applying;
        self.apply_plan(plan, Direction::Up).await
    }

    async fn run_down(&mut self, target: i64) -> Result<()> {
        self.state = RunnerState::Discovering;
        self.state = RunnerState::Filtering;
        let selected = self.filtered_indices();
        self.check_version_conflicts(&selected)?;

        self.store.ensure_schema(&mut self.processor).await?;
        self.acquire_lock().await?;
        let outcome = self.run_down_locked(&selected, target).await;
        self.finish_locked(outcome).await
    }

    async fn run_down_locked(&mut self, selected: &[usize], target: i64) -> Result<()> {
        self.state = RunnerState::Diffing;
        let applied = self.store.applied_versions(&mut self.processor).await?;

        let mut plan = Vec::new();
        for &version in applied.iter().rev().filter(|&&version| version > target) {
            let index = selected
                .iter()
                .copied()
                .find(|&index| {
                    let migration = &self.registry.migrations()[index];
                    !migration.maintenance && migration.version == version
                })
                .ok_or(MigrateError::NoDownMigration(version))?;
            let migration = &self.registry.migrations()[index];
            let script = migration.script();
            if script.down.is_empty() {
                return Err(MigrateError::NoDownMigration(version));
            }
            plan.push(PlannedStep {
                version,
                description: migration.description.clone(),
                expressions: script.down,
                record: true,
            });
        }

        self.state = RunnerState::Applying;
        self.apply_plan(plan, Direction::Down).await
    }

    /// Releases the run lock on both exit paths, preserving the run's error
    /// over any release failure.
    async fn finish_locked(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.release_lock().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(release_err) = self.release_lock().await {
                    warn!(error = %release_err, "failed to release run lock");
                }
                Err(err)
            }
        }
    }

    fn filtered_indices(&self) -> Vec<usize> {
        self.registry
            .migrations()
            .iter()
            .enumerate()
            .filter(|(_, migration)| {
                let profile_match = match (&migration.profile, &self.profile) {
                    (None, _) => true,
                    (Some(declared), Some(requested)) => declared == requested,
                    (Some(_), None) => false,
                };
                let tag_match = self.tags.is_empty()
                    || migration.tags.iter().any(|tag| self.tags.contains(tag));
                profile_match && tag_match
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn check_version_conflicts(&self, selected: &[usize]) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for &index in selected {
            let version = self.registry.migrations()[index].version;
            if !seen.insert(version) {
                return Err(MigrateError::VersionConflict(version));
            }
        }
        Ok(())
    }

    async fn apply_plan(&mut self, plan: Vec<PlannedStep>, direction: Direction) -> Result<()> {
        if !plan.is_empty() && !self.dialect.supports_transactional_ddl() {
            warn!(
                dialect = self.dialect.name(),
                "DDL does not participate in transactions on this dialect; a failed migration can leave partial schema changes"
            );
        }
        let per_migration = self.processor.options().transaction_per_migration;
        if !per_migration {
            self.processor.begin().await?;
        }
        for step in plan {
            if let Err(err) = self.apply_step(&step, direction, per_migration).await {
                if let Err(rollback_err) = self.processor.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                return Err(err);
            }
        }
        if !per_migration {
            self.processor.commit().await?;
        }
        Ok(())
    }

    async fn apply_step(
        &mut self,
        step: &PlannedStep,
        direction: Direction,
        per_migration: bool,
    ) -> Result<()> {
        if per_migration {
            self.processor.begin().await?;
        }
        match direction {
            Direction::Up => {
                info!(version = step.version, description = %step.description, "applying migration");
            }
            Direction::Down => {
                info!(version = step.version, description = %step.description, "reverting migration");
            }
        }

        for (index, expression) in step.expressions.iter().enumerate() {
            self.apply_expression(step.version, index, expression).await?;
        }

        if step.record {
            match direction {
                Direction::Up => {
                    self.store
                        .mark_applied(&mut self.processor, step.version, &step.description)
                        .await?;
                }
                Direction::Down => {
                    self.store
                        .mark_unapplied(&mut self.processor, step.version)
                        .await?;
                }
            }
        }

        if per_migration {
            self.processor.commit().await?;
        }
        Ok(())
    }

    async fn apply_expression(
        &mut self,
        version: i64,
        index: usize,
        expression: &Expression,
    ) -> Result<()> {
        let kind = expression.kind();
        debug!(version, index, kind, "processing expression");

        let statements = expression
            .validate()
            .and_then(|()| self.dialect.generate(expression))
            .map_err(|source| MigrateError::Execution {
                version,
                index,
                kind,
                source: Box::new(source),
            })?;

        for sql in &statements {
            self.processor
                .execute(sql)
                .await
                .map_err(|source| MigrateError::Execution {
                    version,
                    index,
                    kind,
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    fn lock_table(&self) -> String {
        format!("{}_lock", self.store.table())
    }

    /// Takes the advisory run lock. The lock row lives next to the ledger
    /// and is held for the whole run; contention fails fast instead of
    /// queueing.
    async fn acquire_lock(&mut self) -> Result<()> {
        if self.processor.options().preview {
            return Ok(());
        }
        let table = quote_table(&self.lock_table());
        self.processor
            .execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n  id INTEGER PRIMARY KEY CHECK (id = 1),\n  locked_at TEXT NOT NULL\n)"
            ))
            .await?;
        let affected = self
            .processor
            .execute(&format!(
                "INSERT OR IGNORE INTO {table} (id, locked_at) VALUES (1, '{}')",
                Utc::now().to_rfc3339()
            ))
            .await?;
        if affected == 0 {
            return Err(MigrateError::AlreadyRunning);
        }
        Ok(())
    }

    async fn release_lock(&mut self) -> Result<()> {
        if self.processor.options().preview {
            return Ok(());
        }
        let table = quote_table(&self.lock_table());
        self.processor
            .execute(&format!("DELETE FROM {table} WHERE id = 1"))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::processor::ProcessorOptions;
    use crate::schema::{ColumnDef, SqlType};
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn users_registry() -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();
        registry.register(RegisteredMigration::new(1, "create users", || {
            MigrationScript {
                up: vec![Expression::create_table(
                    "Users",
                    vec![
                        ColumnDef::new("Id", SqlType::Integer)
                            .primary_key()
                            .auto_increment(),
                        ColumnDef::new("Name", SqlType::Text).not_null(),
                    ],
                )],
                down: vec![Expression::drop_table("Users")],
            }
        }));
        registry.register(RegisteredMigration::new(2, "add email", || {
            MigrationScript {
                up: vec![Expression::add_column(
                    "Users",
                    ColumnDef::new("Email", SqlType::Text),
                )],
                down: vec![Expression::drop_column("Users", "Email")],
            }
        }));
        registry.register(RegisteredMigration::new(3, "index email", || {
            MigrationScript {
                up: vec![Expression::create_index(
                    "IX_Users_Email",
                    "Users",
                    vec!["Email".to_string()],
                    false,
                )],
                down: vec![Expression::drop_index("IX_Users_Email")],
            }
        }));
        registry
    }

    fn runner_over(pool: SqlitePool, registry: MigrationRegistry) -> Runner {
        Runner::new(
            Processor::new(pool, ProcessorOptions::default()),
            Box::new(SqliteDialect::new()),
            registry,
        )
    }

    async fn applied_versions(runner: &mut Runner) -> Vec<i64> {
        runner
            .list_migrations()
            .await
            .unwrap()
            .into_iter()
            .filter(|status| status.applied_on.is_some())
            .map(|status| status.version)
            .collect()
    }

    #[tokio::test]
    async fn test_migrate_up_applies_in_order() {
        let pool = create_test_pool().await;
        let mut runner = runner_over(pool, users_registry());

        runner.migrate_up(None).await.unwrap();

        assert_eq!(runner.state(), RunnerState::Completed);
        assert_eq!(applied_versions(&mut runner).await, vec![1, 2, 3]);

        let records = runner.list_migrations().await.unwrap();
        assert!(records.iter().all(|status| status.applied_on.is_some()));
    }

    #[tokio::test]
    async fn test_scenario_up_then_down_to_one() {
        let pool = create_test_pool().await;
        let mut runner = runner_over(pool.clone(), users_registry());

        runner.migrate_up(None).await.unwrap();

        let mut probe = Processor::new(pool.clone(), ProcessorOptions::default());
        assert!(probe.table_exists("Users").await.unwrap());
        assert!(probe.column_exists("Users", "Email").await.unwrap());
        assert!(probe.index_exists("IX_Users_Email").await.unwrap());

        runner.migrate_down(1).await.unwrap();

        assert_eq!(applied_versions(&mut runner).await, vec![1]);
        assert!(probe.table_exists("Users").await.unwrap());
        assert!(!probe.column_exists("Users", "Email").await.unwrap());
        assert!(!probe.index_exists("IX_Users_Email").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_up_to_target() {
        let pool = create_test_pool().await;
        let mut runner = runner_over(pool, users_registry());

        runner.migrate_up(Some(2)).await.unwrap();

        assert_eq!(applied_versions(&mut runner).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_migrate_up_is_idempotent() {
        let pool = create_test_pool().await;
        let mut runner = runner_over(pool, users_registry());

        runner.migrate_up(None).await.unwrap();
        runner.migrate_up(None).await.unwrap();

        assert_eq!(applied_versions(&mut runner).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_rollback_last_count() {
        let pool = create_test_pool().await;
        let mut runner = runner_over(pool, users_registry());

        runner.migrate_up(None).await.unwrap();
        runner.rollback_last(2).await.unwrap();

        assert_eq!(applied_versions(&mut runner).await, vec![1]);
    }

    #[tokio::test]
    async fn test_rollback_everything() {
        let pool = create_test_pool().await;
        let mut runner = runner_over(pool.clone(), users_registry());

        runner.migrate_up(None).await.unwrap();
        runner.rollback_last(10).await.unwrap();

        assert!(applied_versions(&mut runner).await.is_empty());
        let mut probe = Processor::new(pool, ProcessorOptions::default());
        assert!(!probe.table_exists("Users").await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_aborts_and_keeps_prior_commits() {
        let pool = create_test_pool().await;
        let mut registry = users_registry();
        registry.register(RegisteredMigration::new(4, "broken", || {
            MigrationScript {
                up: vec![
                    Expression::execute_sql("INSERT INTO no_such_table VALUES (1)"),
                ],
                down: vec![],
            }
        }));
        let mut runner = runner_over(pool, registry);

        let err = runner.migrate_up(None).await.unwrap_err();

        assert_eq!(runner.state(), RunnerState::Aborted);
        match err {
            MigrateError::Execution { version, index, kind, .. } => {
                assert_eq!(version, 4);
                assert_eq!(index, 0);
                assert_eq!(kind, "ExecuteSql");
            }
            other => panic!("expected Execution error, got {other:?}"),
        }
        // Migrations 1..=3 committed before the failure and stay applied.
        assert_eq!(applied_versions(&mut runner).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_migration_rolls_back_atomically() {
        let pool = create_test_pool().await;
        let mut registry = MigrationRegistry::new();
        registry.register(RegisteredMigration::new(1, "partial", || {
            MigrationScript {
                up: vec![
                    Expression::create_table(
                        "Stray",
                        vec![ColumnDef::new("Id", SqlType::Integer).primary_key()],
                    ),
                    Expression::execute_sql("INSERT INTO no_such_table VALUES (1)"),
                ],
                down: vec![],
            }
        }));
        let mut runner = runner_over(pool.clone(), registry);

        runner.migrate_up(None).await.unwrap_err();

        // The first statement's table must not survive the failed migration.
        let mut probe = Processor::new(pool, ProcessorOptions::default());
        assert!(!probe.table_exists("Stray").await.unwrap());
        assert!(applied_versions(&mut runner).await.is_empty());
    }

    #[tokio::test]
    async fn test_profile_filtering() {
        let pool = create_test_pool().await;
        let mut registry = users_registry();
        registry.register(
            RegisteredMigration::new(10, "reporting views", || MigrationScript {
                up: vec![Expression::execute_sql(
                    "CREATE VIEW user_report AS SELECT Name FROM Users",
                )],
                down: vec![Expression::execute_sql("DROP VIEW user_report")],
            })
            .profile("reporting"),
        );
        let mut runner = runner_over(pool.clone(), registry);

        runner.migrate_up(None).await.unwrap();
        assert_eq!(applied_versions(&mut runner).await, vec![1, 2, 3]);

        let mut registry = users_registry();
        registry.register(
            RegisteredMigration::new(10, "reporting views", || MigrationScript {
                up: vec![Expression::execute_sql(
                    "CREATE VIEW user_report AS SELECT Name FROM Users",
                )],
                down: vec![Expression::execute_sql("DROP VIEW user_report")],
            })
            .profile("reporting"),
        );
        let mut runner = runner_over(pool, registry).with_profile("reporting");
        runner.migrate_up(None).await.unwrap();
        assert_eq!(applied_versions(&mut runner).await, vec![1, 2, 3, 10]);
    }

    #[tokio::test]
    async fn test_tag_filtering() {
        let pool = create_test_pool().await;
        let mut registry = MigrationRegistry::new();
        registry.register(
            RegisteredMigration::new(1, "tagged", || MigrationScript {
                up: vec![Expression::create_table(
                    "Tagged",
                    vec![ColumnDef::new("Id", SqlType::Integer).primary_key()],
                )],
                down: vec![],
            })
            .tag("seed"),
        );
        registry.register(RegisteredMigration::new(2, "untagged", || {
            MigrationScript {
                up: vec![Expression::create_table(
                    "Untagged",
                    vec![ColumnDef::new("Id", SqlType::Integer).primary_key()],
                )],
                down: vec![],
            }
        }));
        let mut runner = runner_over(pool, registry).with_tags(vec!["seed".to_string()]);

        runner.migrate_up(None).await.unwrap();

        assert_eq!(applied_versions(&mut runner).await, vec![1]);
    }

    #[tokio::test]
    async fn test_duplicate_versions_refuse_to_start() {
        let pool = create_test_pool().await;
        let mut registry = users_registry();
        registry.register(RegisteredMigration::new(2, "also two", || {
            MigrationScript {
                up: vec![Expression::execute_sql("SELECT 1")],
                down: vec![],
            }
        }));
        let mut runner = runner_over(pool, registry);

        let err = runner.migrate_up(None).await.unwrap_err();

        assert!(matches!(err, MigrateError::VersionConflict(2)));
        assert_eq!(runner.state(), RunnerState::Aborted);
        assert!(applied_versions(&mut runner).await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_contention() {
        let pool = create_test_pool().await;
        let mut holder = Processor::new(pool.clone(), ProcessorOptions::default());
        holder
            .execute(
                "CREATE TABLE sqlstrata_versions_lock (id INTEGER PRIMARY KEY CHECK (id = 1), locked_at TEXT NOT NULL)",
            )
            .await
            .unwrap();
        holder
            .execute("INSERT INTO sqlstrata_versions_lock (id, locked_at) VALUES (1, 'now')")
            .await
            .unwrap();

        let mut runner = runner_over(pool, users_registry());
        let err = runner.migrate_up(None).await.unwrap_err();

        assert!(matches!(err, MigrateError::AlreadyRunning));
        assert!(applied_versions(&mut runner).await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_released_after_failed_run() {
        let pool = create_test_pool().await;
        let mut registry = MigrationRegistry::new();
        registry.register(RegisteredMigration::new(1, "broken", || {
            MigrationScript {
                up: vec![Expression::execute_sql("INSERT INTO nope VALUES (1)")],
                down: vec![],
            }
        }));
        let mut runner = runner_over(pool.clone(), registry);
        runner.migrate_up(None).await.unwrap_err();

        // A fresh run over the same database must be able to take the lock.
        let mut second = runner_over(pool, users_registry());
        second.migrate_up(None).await.unwrap();
        assert_eq!(second.state(), RunnerState::Completed);
    }

    #[tokio::test]
    async fn test_maintenance_runs_every_invocation_and_is_never_recorded() {
        let pool = create_test_pool().await;

        let build_registry = || {
            let mut registry = MigrationRegistry::new();
            registry.register(RegisteredMigration::new(1, "create counters", || {
                MigrationScript {
                    up: vec![Expression::create_table(
                        "Counters",
                        vec![
                            ColumnDef::new("Id", SqlType::Integer).primary_key(),
                            ColumnDef::new("Hits", SqlType::Integer).not_null(),
                        ],
                    )],
                    down: vec![Expression::drop_table("Counters")],
                }
            }));
            registry.register(
                RegisteredMigration::new(100, "bump counter", || MigrationScript {
                    up: vec![
                        Expression::execute_sql(
                            "INSERT INTO Counters (Id, Hits) VALUES (1, 0) ON CONFLICT DO NOTHING",
                        ),
                        Expression::execute_sql("UPDATE Counters SET Hits = Hits + 1 WHERE Id = 1"),
                    ],
                    down: vec![],
                })
                .maintenance(),
            );
            registry
        };

        let mut runner = runner_over(pool.clone(), build_registry());
        runner.migrate_up(None).await.unwrap();
        let mut runner = runner_over(pool.clone(), build_registry());
        runner.migrate_up(None).await.unwrap();

        // Only the tracked migration is in the ledger.
        assert_eq!(applied_versions(&mut runner).await, vec![1]);

        let mut probe = Processor::new(pool, ProcessorOptions::default());
        let rows = probe
            .query_rows("SELECT Hits FROM Counters WHERE Id = 1")
            .await
            .unwrap();
        use sqlx::Row;
        assert_eq!(rows[0].get::<i64, _>(0), 2);
    }

    #[tokio::test]
    async fn test_missing_down_fails_before_execution() {
        let pool = create_test_pool().await;
        let mut registry = MigrationRegistry::new();
        registry.register(RegisteredMigration::new(1, "one way", || {
            MigrationScript {
                up: vec![Expression::create_table(
                    "OneWay",
                    vec![ColumnDef::new("Id", SqlType::Integer).primary_key()],
                )],
                down: vec![],
            }
        }));
        let mut runner = runner_over(pool.clone(), registry);
        runner.migrate_up(None).await.unwrap();

        let err = runner.migrate_down(0).await.unwrap_err();

        assert!(matches!(err, MigrateError::NoDownMigration(1)));
        // Nothing executed: the table and the ledger row both survive.
        let mut probe = Processor::new(pool, ProcessorOptions::default());
        assert!(probe.table_exists("OneWay").await.unwrap());
        assert_eq!(applied_versions(&mut runner).await, vec![1]);
    }

    #[tokio::test]
    async fn test_preview_touches_nothing() {
        let pool = create_test_pool().await;
        let mut runner = Runner::new(
            Processor::new(pool.clone(), ProcessorOptions::default().preview(true)),
            Box::new(SqliteDialect::new()),
            users_registry(),
        );

        runner.migrate_up(None).await.unwrap();

        assert_eq!(runner.state(), RunnerState::Completed);
        let transcript = runner.processor().preview_transcript();
        assert!(transcript.iter().any(|sql| sql.contains("CREATE TABLE")));
        assert!(transcript.iter().any(|sql| sql.contains("CREATE INDEX")));

        let mut probe = Processor::new(pool, ProcessorOptions::default());
        assert!(!probe.table_exists("Users").await.unwrap());
        assert!(!probe.table_exists("sqlstrata_versions").await.unwrap());
    }

    #[tokio::test]
    async fn test_single_run_transaction_mode() {
        let pool = create_test_pool().await;
        let mut registry = users_registry();
        registry.register(RegisteredMigration::new(4, "broken", || {
            MigrationScript {
                up: vec![Expression::execute_sql("INSERT INTO nope VALUES (1)")],
                down: vec![],
            }
        }));
        let mut runner = Runner::new(
            Processor::new(
                pool.clone(),
                ProcessorOptions::default().transaction_per_migration(false),
            ),
            Box::new(SqliteDialect::new()),
            registry,
        );

        runner.migrate_up(None).await.unwrap_err();

        // One transaction per run: the earlier migrations roll back too.
        let mut probe = Processor::new(pool, ProcessorOptions::default());
        assert!(!probe.table_exists("Users").await.unwrap());
        assert!(applied_versions(&mut runner).await.is_empty());
    }

    #[tokio::test]
    async fn test_migration_trait_registration() {
        struct CreateAccounts;

        impl Migration for CreateAccounts {
            const VERSION: i64 = 1;
            const DESCRIPTION: &'static str = "create accounts";

            fn up() -> Vec<Expression> {
                vec![Expression::create_table(
                    "Accounts",
                    vec![ColumnDef::new("Id", SqlType::Integer).primary_key()],
                )]
            }

            fn down() -> Vec<Expression> {
                vec![Expression::drop_table("Accounts")]
            }
        }

        let pool = create_test_pool().await;
        let mut registry = MigrationRegistry::new();
        registry.register_migration::<CreateAccounts>();
        let mut runner = runner_over(pool.clone(), registry);

        runner.migrate_up(None).await.unwrap();

        let mut probe = Processor::new(pool, ProcessorOptions::default());
        assert!(probe.table_exists("Accounts").await.unwrap());
        assert_eq!(applied_versions(&mut runner).await, vec![1]);
    }

    #[tokio::test]
    async fn test_statement_timeout_aborts_run() {
        use std::time::Duration;

        let pool = create_test_pool().await;
        let mut registry = MigrationRegistry::new();
        registry.register(RegisteredMigration::new(1, "slow backfill", || {
            MigrationScript {
                up: vec![
                    Expression::create_table(
                        "Numbers",
                        vec![ColumnDef::new("N", SqlType::Integer)],
                    ),
                    Expression::execute_sql(
                        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 10000000) \
                         INSERT INTO Numbers SELECT x FROM c",
                    ),
                ],
                down: vec![],
            }
        }));
        let mut runner = Runner::new(
            Processor::new(
                pool.clone(),
                ProcessorOptions::default().statement_timeout(Duration::from_millis(50)),
            ),
            Box::new(SqliteDialect::new()),
            registry,
        );

        let err = runner.migrate_up(None).await.unwrap_err();

        assert_eq!(runner.state(), RunnerState::Aborted);
        match err {
            MigrateError::Execution {
                version,
                index,
                source,
                ..
            } => {
                assert_eq!(version, 1);
                assert_eq!(index, 1);
                assert!(matches!(*source, MigrateError::Timeout { .. }));
            }
            other => panic!("expected Execution error, got {other:?}"),
        }
        // The timed-out migration rolled back wholesale.
        let mut probe = Processor::new(pool, ProcessorOptions::default());
        assert!(!probe.table_exists("Numbers").await.unwrap());
        assert!(applied_versions(&mut runner).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_migrations_json() {
        let pool = create_test_pool().await;
        let mut runner = runner_over(pool, users_registry());
        runner.migrate_up(Some(1)).await.unwrap();

        let json = runner.list_migrations_json().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["version"], 1);
        assert!(rows[0]["applied_on"].is_string());
        assert!(rows[1]["applied_on"].is_null());
    }

    #[tokio::test]
    async fn test_non_transactional_ddl_dialect_still_completes() {
        struct NoDdlTxDialect;

        impl Dialect for NoDdlTxDialect {
            fn name(&self) -> &'static str {
                "sqlite-noddltx"
            }

            fn max_identifier_length(&self) -> usize {
                usize::MAX
            }

            fn auto_increment_keyword(&self) -> &'static str {
                "AUTOINCREMENT"
            }

            fn supports_transactional_ddl(&self) -> bool {
                false
            }

            fn type_name(&self, sql_type: &SqlType) -> String {
                SqliteDialect::new().type_name(sql_type)
            }

            fn generate(&self, expression: &Expression) -> Result<Vec<String>> {
                SqliteDialect::new().generate(expression)
            }
        }

        let pool = create_test_pool().await;
        let mut runner = Runner::new(
            Processor::new(pool, ProcessorOptions::default()),
            Box::new(NoDdlTxDialect),
            users_registry(),
        );

        runner.migrate_up(None).await.unwrap();

        assert_eq!(runner.state(), RunnerState::Completed);
        assert_eq!(applied_versions(&mut runner).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_list_includes_orphaned_ledger_rows() {
        let pool = create_test_pool().await;
        let mut runner = runner_over(pool.clone(), users_registry());
        runner.migrate_up(None).await.unwrap();

        // Same ledger, but the registry no longer knows version 3.
        let mut registry = MigrationRegistry::new();
        registry.register(RegisteredMigration::new(1, "create users", || {
            MigrationScript {
                up: vec![],
                down: vec![],
            }
        }));
        let mut runner = runner_over(pool, registry);

        let statuses = runner.list_migrations().await.unwrap();
        let orphan = statuses.iter().find(|s| s.version == 3).unwrap();
        assert!(orphan.applied_on.is_some());
        assert_eq!(orphan.description, "index email");
    }
}
