//! Layered settings: built-in defaults, then an optional file, then
//! `TEMPORA_`-prefixed environment variables (`TEMPORA_TABLE__NAME=people`).

use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{QueryContext, Result, TemporaError};
use crate::generator::{GENESIS, IdGenerator, RandomGenerator, SequentialGenerator, Strategy};
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use crate::store::{DEFAULT_ID_COLUMN, RowStore};

pub const ENV_PREFIX: &str = "TEMPORA";
pub const IN_MEMORY_PATH: &str = ":memory:";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    pub name: String,
    pub id_column: String,
}
impl Default for TableSettings {
    fn default() -> Self {
        Self { name: "rows".to_string(), id_column: DEFAULT_ID_COLUMN.to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdGeneratorSettings {
    pub strategy: Strategy,
    pub min: i64,
    pub max: i64,
    pub max_attempts: u32,
}
impl Default for IdGeneratorSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Sequential,
            min: GENESIS,
            max: i32::MAX as i64,
            max_attempts: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: Backend,
    /// SQLite database file; `:memory:` for a private in-memory database.
    pub path: String,
}
impl Default for StorageSettings {
    fn default() -> Self {
        Self { backend: Backend::Memory, path: IN_MEMORY_PATH.to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub table: TableSettings,
    pub id_generator: IdGeneratorSettings,
    pub storage: StorageSettings,
    pub log_level: String,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            table: TableSettings::default(),
            id_generator: IdGeneratorSettings::default(),
            storage: StorageSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Reads `path` if it exists (format from its extension), then the
    /// environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_sources(builder)
    }

    /// Anything the builder does not set keeps its default.
    pub fn from_sources(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .build()
            .and_then(|config| config.try_deserialize::<Settings>())
            .map_err(|e| TemporaError::Config(e.to_string()))?;
        settings.validate()?;
        debug!(?settings, "settings loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.name.trim().is_empty() {
            return Err(TemporaError::Config("table.name must not be empty".into()));
        }
        if self.table.id_column.trim().is_empty() {
            return Err(TemporaError::Config("table.id_column must not be empty".into()));
        }
        if self.id_generator.strategy == Strategy::Random {
            self.generator()?;
        }
        Ok(())
    }

    pub fn generator(&self) -> Result<Box<dyn IdGenerator>> {
        let ids = &self.id_generator;
        Ok(match ids.strategy {
            Strategy::Sequential => Box::new(SequentialGenerator),
            Strategy::Random => Box::new(RandomGenerator::new(ids.min, ids.max, ids.max_attempts)?),
        })
    }

    pub fn open_memory(&self) -> Result<MemoryStore> {
        let mut store = MemoryStore::with_generator(self.table.name.as_str(), self.generator()?);
        store.set_id_column(&self.table.id_column)?;
        Ok(store)
    }

    pub fn open_sqlite<'db>(&self, db: &'db Connection) -> Result<SqliteStore<'db>> {
        SqliteStore::with_id_column(db, self.table.name.as_str(), &self.table.id_column, self.generator()?)
    }

    /// Opens `storage.path`. Only meaningful for the SQLite backend.
    pub fn connect(&self) -> Result<Connection> {
        let path = self.storage.path.as_str();
        let db = if path == IN_MEMORY_PATH {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        };
        db.within(format!("opening {path}"))
    }

    /// The configured backend. `db` is only used by the SQLite backend.
    pub fn open<'db>(&self, db: &'db Connection) -> Result<Box<dyn RowStore + 'db>> {
        Ok(match self.storage.backend {
            Backend::Memory => Box::new(self.open_memory()?),
            Backend::Sqlite => Box::new(self.open_sqlite(db)?),
        })
    }
}
