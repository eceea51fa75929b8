//! Ordered, reversible schema migrations.
//!
//! A [`MigrationSet`] is a list of steps with strictly increasing versions.
//! The store records which steps are applied; those must always be a prefix
//! of the set, so the applied/unapplied boundary is a single cut point.
//! [`Migrator`] moves that cut point up or down one step at a time, each
//! step in its own transaction. A failing step stops the run and leaves
//! the cut point after the last step that succeeded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::MigrationError;

/// Which way to move the cut point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply pending steps in ascending order.
    Up,
    /// Revert applied steps in descending order.
    Down,
}

impl Direction {
    /// Lower-case name, as used in file names and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown migration direction {other:?}")),
        }
    }
}

/// One reversible schema step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Ordering key, unique within a set.
    pub version: i64,
    /// Descriptive name.
    pub name: String,
    /// SQL applied when migrating up.
    pub up: String,
    /// SQL applied when migrating down; may be empty.
    pub down: String,
}

impl Migration {
    /// Creates a step.
    #[must_use]
    pub fn new(
        version: i64,
        name: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            up: up.into(),
            down: down.into(),
        }
    }

    /// The script to run for `direction`.
    #[must_use]
    pub fn script(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

/// Steps sorted by version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSet {
    steps: Vec<Migration>,
}

impl MigrationSet {
    /// Sorts `steps` by version.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Source`] if two steps share a version.
    pub fn new(mut steps: Vec<Migration>) -> Result<Self, MigrationError> {
        steps.sort_by_key(|m| m.version);
        for pair in steps.windows(2) {
            if let [a, b] = pair
                && a.version == b.version
            {
                return Err(MigrationError::Source(format!(
                    "duplicate version {} ({} and {})",
                    a.version, a.name, b.name
                )));
            }
        }
        Ok(Self { steps })
    }

    /// All steps, ascending.
    #[must_use]
    pub fn steps(&self) -> &[Migration] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `true` if the set has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns how many leading steps `applied` covers.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Diverged`] if `applied` is not exactly the
    /// versions of a prefix of this set.
    pub fn cut_point(&self, applied: &[i64]) -> Result<usize, MigrationError> {
        let mut applied = applied.to_vec();
        applied.sort_unstable();
        for (index, version) in applied.iter().enumerate() {
            match self.steps.get(index) {
                Some(step) if step.version == *version => {}
                Some(step) => {
                    return Err(MigrationError::Diverged(format!(
                        "recorded version {version} where {} was expected",
                        step.version
                    )));
                }
                None => {
                    return Err(MigrationError::Diverged(format!(
                        "recorded version {version} is not in the migration set"
                    )));
                }
            }
        }
        Ok(applied.len())
    }

    /// Steps to run from cut point `cut`, in execution order.
    #[must_use]
    pub fn plan(&self, cut: usize, direction: Direction, limit: Option<usize>) -> Vec<&Migration> {
        let limit = limit.unwrap_or(usize::MAX);
        match direction {
            Direction::Up => self.steps.iter().skip(cut).take(limit).collect(),
            Direction::Down => self.steps.iter().take(cut).rev().take(limit).collect(),
        }
    }
}

/// Where migration steps come from.
#[async_trait]
pub trait MigrationSource: Send + Sync {
    /// Loads the full, ordered set.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Source`] when the steps cannot be read or
    /// are inconsistent.
    async fn load(&self) -> Result<MigrationSet, MigrationError>;
}

#[async_trait]
impl MigrationSource for MigrationSet {
    async fn load(&self) -> Result<MigrationSet, MigrationError> {
        Ok(self.clone())
    }
}

/// Reads `<version>_<name>.up.sql` / `<version>_<name>.down.sql` pairs.
///
/// A step without a down script reverts as a no-op. Other files are ignored.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    /// Creates a source over `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory being read.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[derive(Default)]
struct PendingStep {
    name: String,
    up: Option<String>,
    down: Option<String>,
}

#[async_trait]
impl MigrationSource for DirectorySource {
    async fn load(&self) -> Result<MigrationSet, MigrationError> {
        let read_err =
            |e: std::io::Error| MigrationError::Source(format!("{}: {e}", self.dir.display()));

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(read_err)?;
        let mut pending: BTreeMap<i64, PendingStep> = BTreeMap::new();

        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let file_name = entry.file_name();
            let Some((version, name, direction)) = file_name.to_str().and_then(parse_file_name)
            else {
                continue;
            };
            if !entry.file_type().await.map_err(read_err)?.is_file() {
                continue;
            }

            let sql = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(read_err)?;
            let step = pending.entry(version).or_insert_with(|| PendingStep {
                name: name.to_string(),
                ..PendingStep::default()
            });
            if step.name != name {
                return Err(MigrationError::Source(format!(
                    "version {version} is used by both {:?} and {name:?}",
                    step.name
                )));
            }
            let slot = match direction {
                Direction::Up => &mut step.up,
                Direction::Down => &mut step.down,
            };
            if slot.replace(sql).is_some() {
                return Err(MigrationError::Source(format!(
                    "duplicate {direction} script for version {version}"
                )));
            }
        }

        let mut steps = Vec::with_capacity(pending.len());
        for (version, step) in pending {
            let Some(up) = step.up else {
                return Err(MigrationError::Source(format!(
                    "version {version} ({}) has a down script but no up script",
                    step.name
                )));
            };
            steps.push(Migration::new(
                version,
                step.name,
                up,
                step.down.unwrap_or_default(),
            ));
        }

        tracing::debug!(dir = %self.dir.display(), steps = steps.len(), "loaded migrations");
        MigrationSet::new(steps)
    }
}

fn parse_file_name(file_name: &str) -> Option<(i64, &str, Direction)> {
    let stem = file_name.strip_suffix(".sql")?;
    let (stem, direction) = if let Some(stem) = stem.strip_suffix(".up") {
        (stem, Direction::Up)
    } else {
        (stem.strip_suffix(".down")?, Direction::Down)
    };
    let (version, name) = stem.split_once('_').unwrap_or((stem, ""));
    Some((version.parse().ok()?, name, direction))
}

/// Bookkeeping backend for applied steps.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Creates the bookkeeping table if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Store`] on database failure.
    async fn ensure_table(&self) -> Result<(), MigrationError>;

    /// Versions currently recorded as applied.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Store`] on database failure.
    async fn applied_versions(&self) -> Result<Vec<i64>, MigrationError>;

    /// Runs one step and updates its record atomically.
    ///
    /// # Errors
    ///
    /// Returns the database error of the step; the record is unchanged.
    async fn apply(&self, step: &Migration, direction: Direction) -> Result<(), sqlx::Error>;
}

/// Moves the cut point of a [`MigrationStore`].
#[derive(Debug)]
pub struct Migrator<S> {
    store: S,
}

impl<S: MigrationStore> Migrator<S> {
    /// Creates a migrator over `store`.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Current cut point of `set`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] if the store fails or has diverged.
    pub async fn cut_point(&self, set: &MigrationSet) -> Result<usize, MigrationError> {
        self.store.ensure_table().await?;
        let applied = self.store.applied_versions().await?;
        set.cut_point(&applied)
    }

    /// Applies up to `limit` steps (all when `None`) in `direction` and
    /// returns how many ran.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Step`] for the first failing step; steps
    /// before it stay applied.
    pub async fn run(
        &self,
        set: &MigrationSet,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<usize, MigrationError> {
        let cut = self.cut_point(set).await?;
        let mut count = 0;
        for step in set.plan(cut, direction, limit) {
            self.store
                .apply(step, direction)
                .await
                .map_err(|source| MigrationError::Step {
                    version: step.version,
                    name: step.name.clone(),
                    direction: direction.as_str(),
                    source,
                })?;
            tracing::debug!(version = step.version, name = %step.name, %direction, "migration step done");
            count += 1;
        }
        tracing::info!(count, %direction, "applied {count} migration(s)");
        Ok(count)
    }
}
