//! Persistent list of past queries and the steps they produced.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context as _;

use crate::foundation::error::{ReelError, ReelResult};
use crate::step::Step;

/// One past query.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HistoryRecord {
    pub query: String,
    pub steps: Vec<Step>,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

/// JSON-file backed history, most recently used first.
///
/// Queries are de-duplicated case-insensitively; recording an existing query moves it to the
/// front with the new steps.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    cap: usize,
    records: Vec<HistoryRecord>,
}

impl HistoryStore {
    /// Load `path` if it exists; a missing file is an empty history.
    pub fn open(path: impl Into<PathBuf>, cap: usize) -> ReelResult<Self> {
        if cap == 0 {
            return Err(ReelError::validation("history cap must be >= 1"));
        }
        let path = path.into();
        let mut records: Vec<HistoryRecord> = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ReelError::validation(format!("invalid history file '{}': {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("read history '{}'", path.display()))
                    .into());
            }
        };
        records.truncate(cap);
        Ok(Self { path, cap, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, query: &str) -> Option<&HistoryRecord> {
        let key = normalize(query);
        self.records.iter().find(|r| normalize(&r.query) == key)
    }

    /// Put `query` at the front, replacing any earlier record of it, and save.
    pub fn record(&mut self, query: &str, steps: Vec<Step>) -> ReelResult<()> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ReelError::validation("history query is empty"));
        }
        let key = normalize(query);
        self.records.retain(|r| normalize(&r.query) != key);
        self.records.insert(
            0,
            HistoryRecord {
                query: query.to_owned(),
                steps,
                timestamp: now_secs(),
            },
        );
        self.records.truncate(self.cap);
        self.save()
    }

    /// Remove `query`; returns whether it was present.
    pub fn remove(&mut self, query: &str) -> ReelResult<bool> {
        let key = normalize(query);
        let before = self.records.len();
        self.records.retain(|r| normalize(&r.query) != key);
        if self.records.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn clear(&mut self) -> ReelResult<()> {
        self.records.clear();
        self.save()
    }

    fn save(&self) -> ReelResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create history dir '{}'", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.records).context("serialize history")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("write '{}'", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace history '{}'", self.path.display()))?;
        Ok(())
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
