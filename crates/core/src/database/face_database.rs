use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rayon::prelude::*;
use thiserror::Error;

use crate::biometric::domain::engine::TemplateMatcher;
use crate::biometric::domain::template::DemographicEstimate;
use crate::database::face_record::{FaceRecord, Snapshot};
use crate::shared::constants::{
    DEFAULT_AGE_MISMATCH_PENALTY, DEFAULT_AGE_RATIO_BAND, DEFAULT_GENDER_MISMATCH_PENALTY,
};
use crate::shared::FaceId;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("template length {actual} does not match library contract {expected}")]
    InvalidTemplate { expected: usize, actual: usize },
    #[error("face id {0} not found")]
    UnknownId(FaceId),
    #[error("cannot merge face id {0} into itself")]
    SelfMerge(FaceId),
}

/// How demographic metadata participates in a database-wide search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataMode {
    /// Raw template similarity only.
    Ignore,
    /// Implausible candidates are weighted down before the max is taken.
    Penalize,
    /// Implausible candidates are removed before scoring (pre-filter).
    Exclude,
}

/// Weights for metadata-aware scoring. Gender disagreement weighs a
/// candidate down but never eliminates it; only the age-ratio pre-filter
/// excludes outright.
#[derive(Clone, Copy, Debug)]
pub struct MetadataPenalties {
    /// Age ratio (younger / older) below which ages are implausible.
    pub age_ratio_band: f32,
    pub age_penalty: f32,
    pub gender_penalty: f32,
}

impl Default for MetadataPenalties {
    fn default() -> Self {
        Self {
            age_ratio_band: DEFAULT_AGE_RATIO_BAND,
            age_penalty: DEFAULT_AGE_MISMATCH_PENALTY,
            gender_penalty: DEFAULT_GENDER_MISMATCH_PENALTY,
        }
    }
}

/// Result of a similarity search: the maximal-similarity record with the
/// snapshot that produced the score. An empty database yields `None`
/// from the search methods instead of a value in this type.
#[derive(Clone, Debug)]
pub struct BestMatch {
    pub face_id: FaceId,
    pub similarity: f32,
    pub snapshot: Snapshot,
    pub name: Option<String>,
}

/// Snapshot-consistent copy of the whole store, for rollback around
/// risky bulk operations such as deserializing an untrusted stream.
pub struct DatabaseBackup {
    records: HashMap<FaceId, FaceRecord>,
    next_id: u64,
}

/// Concurrent keyed store of identity records.
///
/// Locking is internal: readers (matching) and writers (template adds)
/// never synchronize at the call site. `next_id` is always
/// `1 + max(id ever inserted)`, monotonically non-decreasing, and never
/// reused even after a record is merged away.
pub struct FaceDatabase {
    matcher: Arc<dyn TemplateMatcher>,
    records: RwLock<HashMap<FaceId, FaceRecord>>,
    next_id: AtomicU64,
    penalties: MetadataPenalties,
}

impl FaceDatabase {
    pub fn new(matcher: Arc<dyn TemplateMatcher>) -> Self {
        Self::with_penalties(matcher, MetadataPenalties::default())
    }

    pub fn with_penalties(matcher: Arc<dyn TemplateMatcher>, penalties: MetadataPenalties) -> Self {
        Self {
            matcher,
            records: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            penalties,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// The id the next inserted record will receive.
    pub fn next_id(&self) -> FaceId {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn contains(&self, id: FaceId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn name_of(&self, id: FaceId) -> Option<Option<String>> {
        self.read().get(&id).map(|r| r.name().map(str::to_owned))
    }

    pub fn set_name(&self, id: FaceId, name: Option<String>) -> Result<(), DatabaseError> {
        let mut records = self.write();
        let record = records.get_mut(&id).ok_or(DatabaseError::UnknownId(id))?;
        record.set_name(name);
        Ok(())
    }

    /// Scans every record in parallel and returns the maximal-similarity
    /// one, or `None` on an empty database. Ties between equal-similarity
    /// records are broken by unspecified enumeration order.
    pub fn best_match(
        &self,
        template: &[u8],
        demographics: Option<&DemographicEstimate>,
        mode: MetadataMode,
    ) -> Option<BestMatch> {
        let records = self.read();
        let scored = records
            .par_iter()
            .filter(|(_, record)| {
                mode != MetadataMode::Exclude
                    || demographics.map_or(true, |d| self.plausible(record, d))
            })
            .filter_map(|(id, record)| {
                let (raw, index) = record.similarity_to(self.matcher.as_ref(), template)?;
                let similarity = match (mode, demographics) {
                    (MetadataMode::Penalize, Some(d)) => self.penalized(raw, record, d),
                    _ => raw,
                };
                Some((*id, similarity, index))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

        let (face_id, similarity, index) = scored;
        let record = &records[&face_id];
        Some(BestMatch {
            face_id,
            similarity,
            snapshot: record.snapshots()[index].clone(),
            name: record.name().map(str::to_owned),
        })
    }

    /// Penalized similarity of one record, with the winning snapshot.
    /// `None` when the id is unknown (e.g. merged away concurrently).
    pub fn score_record(
        &self,
        id: FaceId,
        template: &[u8],
        demographics: Option<&DemographicEstimate>,
    ) -> Option<BestMatch> {
        let records = self.read();
        let record = records.get(&id)?;
        let (raw, index) = record.similarity_to(self.matcher.as_ref(), template)?;
        let similarity = match demographics {
            Some(d) => self.penalized(raw, record, d),
            None => raw,
        };
        Some(BestMatch {
            face_id: id,
            similarity,
            snapshot: record.snapshots()[index].clone(),
            name: record.name().map(str::to_owned),
        })
    }

    /// Appends a snapshot to `id` if present, otherwise creates the
    /// record under that id, advancing `next_id` past it.
    pub fn add_or_update(
        &self,
        id: FaceId,
        template: Vec<u8>,
        demographics: &DemographicEstimate,
        image_png: Option<Vec<u8>>,
    ) -> Result<(), DatabaseError> {
        self.validate(&template)?;
        let mut records = self.write();
        match records.get_mut(&id) {
            Some(record) => record.add_snapshot(template, demographics, image_png),
            None => {
                records.insert(id, FaceRecord::new(template, demographics, image_png));
                self.bump_next_id(id);
            }
        }
        Ok(())
    }

    /// Creates a record under a freshly allocated id.
    pub fn add_new_face(
        &self,
        name: Option<String>,
        template: Vec<u8>,
        demographics: &DemographicEstimate,
        image_png: Option<Vec<u8>>,
    ) -> Result<FaceId, DatabaseError> {
        self.validate(&template)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut record = FaceRecord::new(template, demographics, image_png);
        record.set_name(name);
        self.write().insert(id, record);
        Ok(id)
    }

    /// Non-overwriting create: `Ok(false)` when `id` already exists.
    pub fn try_add_new_face(
        &self,
        id: FaceId,
        name: Option<String>,
        template: Vec<u8>,
        demographics: &DemographicEstimate,
        image_png: Option<Vec<u8>>,
    ) -> Result<bool, DatabaseError> {
        self.validate(&template)?;
        let mut records = self.write();
        if records.contains_key(&id) {
            return Ok(false);
        }
        let mut record = FaceRecord::new(template, demographics, image_png);
        record.set_name(name);
        records.insert(id, record);
        self.bump_next_id(id);
        Ok(true)
    }

    /// Non-overwriting append: `Ok(false)` when `id` does not exist.
    pub fn try_add_template(
        &self,
        id: FaceId,
        template: Vec<u8>,
        demographics: &DemographicEstimate,
        image_png: Option<Vec<u8>>,
    ) -> Result<bool, DatabaseError> {
        self.validate(&template)?;
        let mut records = self.write();
        match records.get_mut(&id) {
            Some(record) => {
                record.add_snapshot(template, demographics, image_png);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unions `from`'s snapshots into `into`, then removes `from`.
    /// `into`'s name and aggregates are retained; `from`'s are
    /// discarded. `next_id` is unaffected: a merged-away id is never
    /// reissued.
    pub fn merge_faces(&self, into: FaceId, from: FaceId) -> Result<(), DatabaseError> {
        if into == from {
            return Err(DatabaseError::SelfMerge(into));
        }
        let mut records = self.write();
        if !records.contains_key(&into) {
            return Err(DatabaseError::UnknownId(into));
        }
        let source = records
            .remove(&from)
            .ok_or(DatabaseError::UnknownId(from))?;
        if let Some(target) = records.get_mut(&into) {
            target.merge(source);
        }
        Ok(())
    }

    pub fn backup(&self) -> DatabaseBackup {
        let records = self.read();
        DatabaseBackup {
            records: records.clone(),
            next_id: self.next_id.load(Ordering::SeqCst),
        }
    }

    pub fn restore(&self, backup: DatabaseBackup) {
        let mut records = self.write();
        *records = backup.records;
        self.next_id.store(backup.next_id, Ordering::SeqCst);
    }

    /// Inserts a record under an explicit id during deserialization.
    /// Returns `false` (store untouched) when the id is already present.
    pub(crate) fn insert_stored(&self, id: FaceId, record: FaceRecord) -> bool {
        let mut records = self.write();
        if records.contains_key(&id) {
            return false;
        }
        records.insert(id, record);
        self.bump_next_id(id);
        true
    }

    pub(crate) fn snapshot_records(&self) -> Vec<(FaceId, FaceRecord)> {
        let records = self.read();
        let mut out: Vec<_> = records.iter().map(|(id, r)| (*id, r.clone())).collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    fn validate(&self, template: &[u8]) -> Result<(), DatabaseError> {
        let expected = self.matcher.template_len();
        if !FaceRecord::is_valid_template(template, expected) {
            return Err(DatabaseError::InvalidTemplate {
                expected,
                actual: template.len(),
            });
        }
        Ok(())
    }

    fn bump_next_id(&self, inserted: FaceId) {
        self.next_id.fetch_max(inserted + 1, Ordering::SeqCst);
    }

    fn plausible(&self, record: &FaceRecord, demographics: &DemographicEstimate) -> bool {
        if let (Some(a), Some(b)) = (demographics.age, record.mean_age()) {
            if age_ratio(a, b) < self.penalties.age_ratio_band {
                return false;
            }
        }
        let record_gender = record.gender();
        if demographics.gender.is_known()
            && record_gender.is_known()
            && demographics.gender != record_gender
        {
            return false;
        }
        true
    }

    fn penalized(&self, raw: f32, record: &FaceRecord, demographics: &DemographicEstimate) -> f32 {
        let mut similarity = raw;
        if let (Some(a), Some(b)) = (demographics.age, record.mean_age()) {
            if age_ratio(a, b) < self.penalties.age_ratio_band {
                similarity *= self.penalties.age_penalty;
            }
        }
        let record_gender = record.gender();
        if demographics.gender.is_known()
            && record_gender.is_known()
            && demographics.gender != record_gender
        {
            similarity *= self.penalties.gender_penalty;
        }
        similarity
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<FaceId, FaceRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<FaceId, FaceRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn age_ratio(a: f32, b: f32) -> f32 {
    let (younger, older) = if a < b { (a, b) } else { (b, a) };
    if older <= 0.0 {
        return 1.0;
    }
    younger / older
}
