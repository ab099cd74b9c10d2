//! Durable store for ceremonies, action items, learnings, and application
//! history, backed by redb.
//!
//! # Table design
//!
//! Ceremonies, action items, learnings, and transcripts are keyed by their
//! 16-byte uuid. Applications use a 40-byte composite key:
//!
//! ```text
//! [ learning uuid: 16 bytes | applied_at_ms: u64 big-endian | app uuid: 16 bytes ]
//! ```
//!
//! The learning-id prefix makes one learning's history a single range scan,
//! and the big-endian timestamp in the middle returns it in time order.
//!
//! # Atomicity
//!
//! `record_ceremony` writes the ceremony row, every action item, every
//! learning, and the transcript inside one `WriteTransaction`. redb aborts
//! an uncommitted transaction on drop, so a failure at any point leaves the
//! store exactly as it was. `record_application` likewise pairs the audit
//! row with the learning-statistics update in one transaction.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::ceremony::{ActionItem, Ceremony};
use crate::error::{CadenceError, Result};
use crate::learning::{Learning, LearningApplication};
use crate::paths;
use crate::types::CeremonyState;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const CEREMONIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ceremonies");
const ACTION_ITEMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("action_items");
const LEARNINGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("learnings");
const APPLICATIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("applications");
const TRANSCRIPTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("transcripts");

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn uuid_key(id: Uuid) -> [u8; 16] {
    *id.as_bytes()
}

fn app_key(learning_id: Uuid, applied_at: DateTime<Utc>, id: Uuid) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..16].copy_from_slice(learning_id.as_bytes());
    let ms = applied_at.timestamp_millis().max(0) as u64;
    key[16..24].copy_from_slice(&ms.to_be_bytes());
    key[24..].copy_from_slice(id.as_bytes());
    key
}

/// Range bounds covering every application of one learning.
fn app_bounds(learning_id: Uuid) -> ([u8; 40], [u8; 40]) {
    let mut lower = [0u8; 40];
    lower[..16].copy_from_slice(learning_id.as_bytes());
    let mut upper = [0xffu8; 40];
    upper[..16].copy_from_slice(learning_id.as_bytes());
    (lower, upper)
}

fn db_err(e: impl std::fmt::Display) -> CadenceError {
    CadenceError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// CeremonyStore
// ---------------------------------------------------------------------------

pub struct CeremonyStore {
    db: Database,
}

impl CeremonyStore {
    /// Open or create the store at the standard location under `root`.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_at(&paths::db_path(root))
    }

    /// Open or create the store at an explicit path, ensuring all tables
    /// exist before any reads.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(CEREMONIES).map_err(db_err)?;
        wt.open_table(ACTION_ITEMS).map_err(db_err)?;
        wt.open_table(LEARNINGS).map_err(db_err)?;
        wt.open_table(APPLICATIONS).map_err(db_err)?;
        wt.open_table(TRANSCRIPTS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    // ---------------------------------------------------------------------------
    // Ceremony commit
    // ---------------------------------------------------------------------------

    /// Atomically record one ceremony: summary row, action items, learnings,
    /// and transcript, all-or-nothing.
    ///
    /// The ceremony must be in `Executing` state (the store-committed,
    /// VCS-pending stage) and every action item must reference it; either
    /// violation fails before anything is written.
    pub fn record_ceremony(
        &self,
        ceremony: &Ceremony,
        items: &[ActionItem],
        learnings: &[Learning],
    ) -> Result<()> {
        paths::validate_scope(&ceremony.scope)?;
        if ceremony.state != CeremonyState::Executing {
            return Err(CadenceError::Store(format!(
                "ceremony {} must be recorded in executing state, got {}",
                ceremony.id, ceremony.state
            )));
        }
        if let Some(item) = items.iter().find(|i| i.ceremony_id != ceremony.id) {
            return Err(CadenceError::Store(format!(
                "action item {} does not reference ceremony {}",
                item.id, ceremony.id
            )));
        }

        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut t = wt.open_table(CEREMONIES).map_err(db_err)?;
            let value = serde_json::to_vec(ceremony)?;
            t.insert(uuid_key(ceremony.id).as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        {
            let mut t = wt.open_table(ACTION_ITEMS).map_err(db_err)?;
            for item in items {
                let value = serde_json::to_vec(item)?;
                t.insert(uuid_key(item.id).as_slice(), value.as_slice())
                    .map_err(db_err)?;
            }
        }
        {
            let mut t = wt.open_table(LEARNINGS).map_err(db_err)?;
            for learning in learnings {
                let value = serde_json::to_vec(learning)?;
                t.insert(uuid_key(learning.id).as_slice(), value.as_slice())
                    .map_err(db_err)?;
            }
        }
        {
            let mut t = wt.open_table(TRANSCRIPTS).map_err(db_err)?;
            t.insert(
                uuid_key(ceremony.id).as_slice(),
                ceremony.transcript.as_bytes(),
            )
            .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Ceremony queries and state
    // ---------------------------------------------------------------------------

    pub fn get_ceremony(&self, id: Uuid) -> Result<Ceremony> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(CEREMONIES).map_err(db_err)?;
        let guard = t
            .get(uuid_key(id).as_slice())
            .map_err(db_err)?
            .ok_or_else(|| CadenceError::CeremonyNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(guard.value())?)
    }

    /// All ceremonies for a scope, oldest first.
    pub fn list_ceremonies(&self, scope: &str) -> Result<Vec<Ceremony>> {
        let mut out: Vec<Ceremony> = self
            .all_ceremonies()?
            .into_iter()
            .filter(|c| c.scope == scope)
            .collect();
        out.sort_by(|a, b| a.held_at.cmp(&b.held_at));
        Ok(out)
    }

    fn all_ceremonies(&self) -> Result<Vec<Ceremony>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(CEREMONIES).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    /// Ceremonies whose rows are committed but whose VCS commit has not been
    /// confirmed (still `Executing`). Input to the reconciliation pass.
    pub fn pending_vcs(&self) -> Result<Vec<Ceremony>> {
        Ok(self
            .all_ceremonies()?
            .into_iter()
            .filter(|c| c.state == CeremonyState::Executing)
            .collect())
    }

    /// Advance a stored ceremony through its state machine.
    pub fn set_ceremony_state(&self, id: Uuid, to: CeremonyState) -> Result<Ceremony> {
        let mut ceremony = self.get_ceremony(id)?;
        ceremony.transition(to)?;

        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut t = wt.open_table(CEREMONIES).map_err(db_err)?;
            let value = serde_json::to_vec(&ceremony)?;
            t.insert(uuid_key(id).as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(ceremony)
    }

    pub fn transcript(&self, ceremony_id: Uuid) -> Result<Option<String>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(TRANSCRIPTS).map_err(db_err)?;
        match t.get(uuid_key(ceremony_id).as_slice()).map_err(db_err)? {
            Some(guard) => Ok(Some(
                String::from_utf8_lossy(guard.value()).into_owned(),
            )),
            None => Ok(None),
        }
    }

    pub fn action_items(&self, ceremony_id: Uuid) -> Result<Vec<ActionItem>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(ACTION_ITEMS).map_err(db_err)?;
        let mut out: Vec<ActionItem> = Vec::new();
        for entry in t.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let item: ActionItem = serde_json::from_slice(v.value())?;
            if item.ceremony_id == ceremony_id {
                out.push(item);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    // ---------------------------------------------------------------------------
    // Learnings
    // ---------------------------------------------------------------------------

    pub fn get_learning(&self, id: Uuid) -> Result<Learning> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(LEARNINGS).map_err(db_err)?;
        let guard = t
            .get(uuid_key(id).as_slice())
            .map_err(db_err)?
            .ok_or_else(|| CadenceError::LearningNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(guard.value())?)
    }

    /// All learnings, newest first. `active_only` filters out logically
    /// deleted rows.
    pub fn list_learnings(&self, active_only: bool) -> Result<Vec<Learning>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(LEARNINGS).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let learning: Learning = serde_json::from_slice(v.value())?;
            if !active_only || learning.active {
                out.push(learning);
            }
        }
        out.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
        Ok(out)
    }

    /// Overwrite one learning row in its own transaction. Used by the
    /// maintenance job so an interrupt between learnings never leaves a
    /// single learning half-updated.
    pub fn update_learning(&self, learning: &Learning) -> Result<()> {
        // Must already exist: learnings are only created by ceremony commits.
        self.get_learning(learning.id)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut t = wt.open_table(LEARNINGS).map_err(db_err)?;
            let value = serde_json::to_vec(learning)?;
            t.insert(uuid_key(learning.id).as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Applications
    // ---------------------------------------------------------------------------

    /// Append an application row and update the learning's recomputed
    /// statistics in the same transaction. Returns the updated learning.
    pub fn record_application(&self, application: &LearningApplication) -> Result<Learning> {
        let mut learning = self.get_learning(application.learning_id)?;

        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut t = wt.open_table(APPLICATIONS).map_err(db_err)?;
            let key = app_key(
                application.learning_id,
                application.applied_at,
                application.id,
            );
            let value = serde_json::to_vec(application)?;
            t.insert(key.as_slice(), value.as_slice()).map_err(db_err)?;

            // Recompute from the full history, including the new row.
            let (lower, upper) = app_bounds(application.learning_id);
            let mut outcomes = Vec::new();
            for entry in t
                .range(lower.as_slice()..=upper.as_slice())
                .map_err(db_err)?
            {
                let (_, v) = entry.map_err(db_err)?;
                let app: LearningApplication = serde_json::from_slice(v.value())?;
                outcomes.push(app.outcome);
            }
            learning.recompute_stats(&outcomes);
        }
        {
            let mut t = wt.open_table(LEARNINGS).map_err(db_err)?;
            let value = serde_json::to_vec(&learning)?;
            t.insert(uuid_key(learning.id).as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(learning)
    }

    /// One learning's application history, oldest first.
    pub fn applications_for(&self, learning_id: Uuid) -> Result<Vec<LearningApplication>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(APPLICATIONS).map_err(db_err)?;
        let (lower, upper) = app_bounds(learning_id);
        let mut out = Vec::new();
        for entry in t
            .range(lower.as_slice()..=upper.as_slice())
            .map_err(db_err)?
        {
            let (_, v) = entry.map_err(db_err)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    /// Delete application rows older than `cutoff`. Returns rows removed.
    pub fn prune_applications(&self, cutoff: DateTime<Utc>) -> Result<u32> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let mut removed = 0u32;
        {
            let mut t = wt.open_table(APPLICATIONS).map_err(db_err)?;
            let mut stale: Vec<Vec<u8>> = Vec::new();
            for entry in t.iter().map_err(db_err)? {
                let (k, v) = entry.map_err(db_err)?;
                let app: LearningApplication = serde_json::from_slice(v.value())?;
                if app.applied_at < cutoff {
                    stale.push(k.value().to_vec());
                }
            }
            for key in stale {
                t.remove(key.as_slice()).map_err(db_err)?;
                removed += 1;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApplicationOutcome, CeremonyType, LearningCategory, Priority};
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, CeremonyStore) {
        let dir = TempDir::new().unwrap();
        let store = CeremonyStore::open_at(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn executing_ceremony(scope: &str) -> Ceremony {
        let mut c = Ceremony::new(CeremonyType::Standup, scope, vec!["dev".to_string()]);
        c.transition(CeremonyState::Executing).unwrap();
        c.transcript = "## Standup\nall green".to_string();
        c
    }

    fn sample_learning() -> Learning {
        Learning::new(
            "batch db writes",
            LearningCategory::Technical,
            "Group row inserts into one transaction",
            vec!["db".to_string()],
            0.7,
        )
    }

    #[test]
    fn record_and_read_back() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("epic-1");
        let item = ActionItem::new("fix gate", Priority::High, "epic-1", ceremony.id);
        let learning = sample_learning();

        store
            .record_ceremony(&ceremony, &[item.clone()], &[learning.clone()])
            .unwrap();

        let read = store.get_ceremony(ceremony.id).unwrap();
        assert_eq!(read.scope, "epic-1");
        assert_eq!(
            store.transcript(ceremony.id).unwrap().unwrap(),
            "## Standup\nall green"
        );
        let items = store.action_items(ceremony.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "fix gate");
        assert_eq!(store.get_learning(learning.id).unwrap().topic, learning.topic);
    }

    #[test]
    fn record_rejects_wrong_state_leaving_no_rows() {
        let (_dir, store) = open_tmp();
        // Still Triggered: the staged commit must refuse and write nothing.
        let ceremony = Ceremony::new(CeremonyType::Standup, "epic-1", vec![]);
        let learning = sample_learning();
        let err = store.record_ceremony(&ceremony, &[], &[learning.clone()]);
        assert!(err.is_err());
        assert!(store.get_ceremony(ceremony.id).is_err());
        assert!(store.get_learning(learning.id).is_err());
        assert!(store.list_learnings(false).unwrap().is_empty());
    }

    #[test]
    fn record_rejects_foreign_action_item_leaving_no_rows() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("epic-1");
        let foreign = ActionItem::new("orphan", Priority::Low, "epic-1", Uuid::new_v4());
        assert!(store
            .record_ceremony(&ceremony, &[foreign.clone()], &[])
            .is_err());
        assert!(store.get_ceremony(ceremony.id).is_err());
        assert!(store.action_items(ceremony.id).unwrap().is_empty());
    }

    #[test]
    fn record_rejects_invalid_scope_leaving_no_rows() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("Bad Scope");
        assert!(store.record_ceremony(&ceremony, &[], &[]).is_err());
        assert!(store.list_ceremonies("Bad Scope").unwrap().is_empty());
    }

    #[test]
    fn uncommitted_transaction_aborts_on_drop() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("epic-1");
        {
            let wt = store.db.begin_write().unwrap();
            let mut t = wt.open_table(CEREMONIES).unwrap();
            t.insert(
                uuid_key(ceremony.id).as_slice(),
                serde_json::to_vec(&ceremony).unwrap().as_slice(),
            )
            .unwrap();
            // wt dropped without commit
        }
        assert!(store.get_ceremony(ceremony.id).is_err());
    }

    #[test]
    fn set_state_enforces_machine() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("epic-1");
        store.record_ceremony(&ceremony, &[], &[]).unwrap();

        let committed = store
            .set_ceremony_state(ceremony.id, CeremonyState::Committed)
            .unwrap();
        assert_eq!(committed.state, CeremonyState::Committed);

        // Terminal: no further transitions.
        assert!(store
            .set_ceremony_state(ceremony.id, CeremonyState::Failed)
            .is_err());
    }

    #[test]
    fn pending_vcs_lists_executing_only() {
        let (_dir, store) = open_tmp();
        let a = executing_ceremony("epic-1");
        let b = executing_ceremony("epic-2");
        store.record_ceremony(&a, &[], &[]).unwrap();
        store.record_ceremony(&b, &[], &[]).unwrap();
        store
            .set_ceremony_state(a.id, CeremonyState::Committed)
            .unwrap();

        let pending = store.pending_vcs().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }

    #[test]
    fn record_application_updates_stats_atomically() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("epic-1");
        let learning = sample_learning();
        store.record_ceremony(&ceremony, &[], &[learning.clone()]).unwrap();

        let app = LearningApplication::new(
            learning.id,
            "epic-2",
            ApplicationOutcome::Success,
            "applied during planning",
        );
        let updated = store.record_application(&app).unwrap();
        assert_eq!(updated.application_count, 1);
        assert_eq!(updated.success_rate, 1.0);

        let history = store.applications_for(learning.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].scope, "epic-2");

        // The stored learning matches the returned one.
        let stored = store.get_learning(learning.id).unwrap();
        assert_eq!(stored.application_count, 1);
    }

    #[test]
    fn record_application_unknown_learning_writes_nothing() {
        let (_dir, store) = open_tmp();
        let app = LearningApplication::new(
            Uuid::new_v4(),
            "epic-1",
            ApplicationOutcome::Success,
            "ctx",
        );
        assert!(matches!(
            store.record_application(&app),
            Err(CadenceError::LearningNotFound(_))
        ));
        assert!(store.applications_for(app.learning_id).unwrap().is_empty());
    }

    #[test]
    fn applications_are_time_ordered() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("epic-1");
        let learning = sample_learning();
        store.record_ceremony(&ceremony, &[], &[learning.clone()]).unwrap();

        let mut early = LearningApplication::new(
            learning.id,
            "s1",
            ApplicationOutcome::Failure,
            "first",
        );
        early.applied_at = Utc::now() - Duration::days(2);
        let late =
            LearningApplication::new(learning.id, "s2", ApplicationOutcome::Success, "second");

        store.record_application(&late).unwrap();
        store.record_application(&early).unwrap();

        let history = store.applications_for(learning.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].context, "first");
        assert_eq!(history[1].context, "second");
    }

    #[test]
    fn prune_removes_only_stale_rows() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("epic-1");
        let learning = sample_learning();
        store.record_ceremony(&ceremony, &[], &[learning.clone()]).unwrap();

        let mut old =
            LearningApplication::new(learning.id, "s1", ApplicationOutcome::Success, "old");
        old.applied_at = Utc::now() - Duration::days(400);
        let fresh =
            LearningApplication::new(learning.id, "s2", ApplicationOutcome::Success, "fresh");
        store.record_application(&old).unwrap();
        store.record_application(&fresh).unwrap();

        let removed = store
            .prune_applications(Utc::now() - Duration::days(365))
            .unwrap();
        assert_eq!(removed, 1);
        let history = store.applications_for(learning.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].context, "fresh");
    }

    #[test]
    fn list_learnings_filters_inactive() {
        let (_dir, store) = open_tmp();
        let ceremony = executing_ceremony("epic-1");
        let mut learning = sample_learning();
        store.record_ceremony(&ceremony, &[], &[learning.clone()]).unwrap();

        learning.active = false;
        store.update_learning(&learning).unwrap();

        assert!(store.list_learnings(true).unwrap().is_empty());
        assert_eq!(store.list_learnings(false).unwrap().len(), 1);
    }

    #[test]
    fn update_learning_requires_existing_row() {
        let (_dir, store) = open_tmp();
        let learning = sample_learning();
        assert!(matches!(
            store.update_learning(&learning),
            Err(CadenceError::LearningNotFound(_))
        ));
    }
}
