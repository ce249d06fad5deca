//! In-process catalog with fault injection and call accounting.
//!
//! Tables are created on first insert. Rows are keyed by lower-cased column
//! name, mirroring the case-insensitive resolution of the real engine.

use super::{Catalog, CatalogError, CatalogRef, CatalogResult, CatalogSession, Statement};
use crate::batch::Value;
use crate::partition::{PartitionKey, TableId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub type MemoryRow = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogOp {
    Attach,
    Delete,
    Insert,
    Count,
    Close,
}

impl CatalogOp {
    fn of(statement: &Statement) -> Self {
        match statement {
            Statement::DeletePartition(_) => CatalogOp::Delete,
            Statement::InsertBatch { .. } => CatalogOp::Insert,
            Statement::CountPartition(_) => CatalogOp::Count,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<TableId, Vec<MemoryRow>>,
    failing: HashSet<CatalogOp>,
    delays: HashMap<CatalogOp, Duration>,
    calls: HashMap<CatalogOp, usize>,
    open_sessions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn in_partition(row: &MemoryRow, key: &PartitionKey) -> bool {
    row.get(&key.column.to_ascii_lowercase()) == Some(&Value::Date(key.value))
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, op: CatalogOp) {
        lock(&self.state).failing.insert(op);
    }

    pub fn heal(&self, op: CatalogOp) {
        lock(&self.state).failing.remove(&op);
    }

    pub fn delay(&self, op: CatalogOp, delay: Duration) {
        lock(&self.state).delays.insert(op, delay);
    }

    pub fn calls(&self, op: CatalogOp) -> usize {
        lock(&self.state).calls.get(&op).copied().unwrap_or(0)
    }

    /// Attach plus every executed statement.
    pub fn total_calls(&self) -> usize {
        let state = lock(&self.state);
        [
            CatalogOp::Attach,
            CatalogOp::Delete,
            CatalogOp::Insert,
            CatalogOp::Count,
        ]
        .iter()
        .map(|op| state.calls.get(op).copied().unwrap_or(0))
        .sum()
    }

    pub fn open_sessions(&self) -> usize {
        lock(&self.state).open_sessions
    }

    pub fn rows(&self, table: &TableId) -> Vec<MemoryRow> {
        lock(&self.state)
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn partition_rows(&self, key: &PartitionKey) -> usize {
        lock(&self.state)
            .tables
            .get(&key.table)
            .map(|rows| rows.iter().filter(|r| in_partition(r, key)).count())
            .unwrap_or(0)
    }

    /// Seed `rows` directly, bypassing call accounting.
    pub fn seed(&self, table: &TableId, rows: Vec<MemoryRow>) {
        lock(&self.state)
            .tables
            .entry(table.clone())
            .or_default()
            .extend(rows);
    }

    async fn enter(state: &Mutex<State>, op: CatalogOp) -> CatalogResult<()> {
        let delay = {
            let mut state = lock(state);
            *state.calls.entry(op).or_insert(0) += 1;
            state.delays.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(state).failing.contains(&op) {
            return Err(match op {
                CatalogOp::Attach => CatalogError::Attach {
                    catalog: "memory".to_string(),
                    reason: "injected attach failure".to_string(),
                },
                CatalogOp::Close => CatalogError::Close("injected close failure".to_string()),
                other => CatalogError::Statement {
                    statement: format!("{:?}", other).to_lowercase(),
                    reason: "injected failure".to_string(),
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn attach(&self, _catalog: &CatalogRef) -> CatalogResult<Box<dyn CatalogSession>> {
        Self::enter(&self.state, CatalogOp::Attach).await?;
        lock(&self.state).open_sessions += 1;
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
    open: bool,
}

impl MemorySession {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            let mut state = lock(&self.state);
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl CatalogSession for MemorySession {
    async fn execute(&mut self, statement: &Statement) -> CatalogResult<u64> {
        MemoryCatalog::enter(&self.state, CatalogOp::of(statement)).await?;
        let mut state = lock(&self.state);

        Ok(match statement {
            Statement::DeletePartition(key) => {
                let Some(rows) = state.tables.get_mut(&key.table) else {
                    return Ok(0);
                };
                let before = rows.len();
                rows.retain(|r| !in_partition(r, key));
                (before - rows.len()) as u64
            }
            Statement::CountPartition(key) => state
                .tables
                .get(&key.table)
                .map(|rows| rows.iter().filter(|r| in_partition(r, key)).count())
                .unwrap_or(0) as u64,
            Statement::InsertBatch { key, batch } => {
                let rows = state.tables.entry(key.table.clone()).or_default();
                for index in 0..batch.num_rows() {
                    rows.push(
                        batch
                            .columns()
                            .iter()
                            .map(|c| (c.name.to_ascii_lowercase(), c.values[index].clone()))
                            .collect(),
                    );
                }
                batch.num_rows() as u64
            }
        })
    }

    async fn close(mut self: Box<Self>) -> CatalogResult<()> {
        // released even when the close itself reports failure
        self.release();
        MemoryCatalog::enter(&self.state, CatalogOp::Close).await
    }
}
