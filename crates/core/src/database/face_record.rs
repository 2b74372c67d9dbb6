use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::biometric::domain::engine::TemplateMatcher;
use crate::biometric::domain::template::{DemographicEstimate, Gender};

/// One stored (template + optional image) sample of an identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub template: Vec<u8>,
    /// PNG-encoded source cutout, when the caller chose to retain it.
    pub image_png: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
struct RunningMean {
    sum: f64,
    count: u32,
}

impl RunningMean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}

/// One stored identity: aggregated attributes plus its biometric samples.
///
/// Invariant: every stored template passed the fixed-length validity
/// check before insertion (enforced by the database layer); a record is
/// never observable in a partially-written state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    name: Option<String>,
    age: RunningMean,
    /// Averaged over definite-gender samples only.
    gender_confidence: RunningMean,
    male_samples: u32,
    female_samples: u32,
    snapshots: Vec<Snapshot>,
}

impl FaceRecord {
    pub fn new(
        template: Vec<u8>,
        demographics: &DemographicEstimate,
        image_png: Option<Vec<u8>>,
    ) -> Self {
        let mut record = Self::default();
        record.add_snapshot(template, demographics, image_png);
        record
    }

    pub fn is_valid_template(template: &[u8], expected_len: usize) -> bool {
        template.len() == expected_len
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn mean_age(&self) -> Option<f32> {
        self.age.mean()
    }

    pub fn mean_gender_confidence(&self) -> Option<f32> {
        self.gender_confidence.mean()
    }

    /// Majority gender over definite-gender samples; ties are unknown.
    pub fn gender(&self) -> Gender {
        match self.male_samples.cmp(&self.female_samples) {
            std::cmp::Ordering::Greater => Gender::Male,
            std::cmp::Ordering::Less => Gender::Female,
            std::cmp::Ordering::Equal => Gender::Unknown,
        }
    }

    /// Appends a sample and folds its demographics into the running
    /// aggregates. Unknown fields leave the aggregates untouched.
    pub fn add_snapshot(
        &mut self,
        template: Vec<u8>,
        demographics: &DemographicEstimate,
        image_png: Option<Vec<u8>>,
    ) {
        if let Some(age) = demographics.age {
            self.age.push(age as f64);
        }
        match demographics.gender {
            Gender::Male => self.male_samples += 1,
            Gender::Female => self.female_samples += 1,
            Gender::Unknown => {}
        }
        if demographics.gender.is_known() {
            if let Some(confidence) = demographics.gender_confidence {
                self.gender_confidence.push(confidence as f64);
            }
        }
        self.snapshots.push(Snapshot {
            template,
            image_png,
        });
    }

    /// Max similarity of `template` against every stored snapshot, with
    /// the winning snapshot's index. Snapshot comparisons run in
    /// parallel for a single query.
    pub fn similarity_to(
        &self,
        matcher: &dyn TemplateMatcher,
        template: &[u8],
    ) -> Option<(f32, usize)> {
        self.snapshots
            .par_iter()
            .enumerate()
            .map(|(index, snapshot)| (matcher.similarity(template, &snapshot.template), index))
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Appends all of `other`'s snapshots. This record's name and
    /// aggregates are retained; `other`'s are discarded.
    pub fn merge(&mut self, other: FaceRecord) {
        self.snapshots.extend(other.snapshots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Matcher scoring 1.0 for byte-identical templates, 0.0 otherwise.
    struct ExactMatcher;

    impl TemplateMatcher for ExactMatcher {
        fn similarity(&self, a: &[u8], b: &[u8]) -> f32 {
            if a == b {
                1.0
            } else {
                0.0
            }
        }

        fn template_len(&self) -> usize {
            4
        }
    }

    fn demo(age: Option<f32>, gender: Gender, confidence: Option<f32>) -> DemographicEstimate {
        DemographicEstimate {
            age,
            gender,
            gender_confidence: confidence,
        }
    }

    #[test]
    fn test_new_record_has_one_snapshot() {
        let record = FaceRecord::new(vec![1, 2, 3, 4], &DemographicEstimate::unknown(), None);
        assert_eq!(record.snapshots().len(), 1);
        assert_eq!(record.name(), None);
        assert_eq!(record.mean_age(), None);
        assert_eq!(record.gender(), Gender::Unknown);
    }

    #[test]
    fn test_age_running_average() {
        let mut record = FaceRecord::new(
            vec![0; 4],
            &demo(Some(20.0), Gender::Unknown, None),
            None,
        );
        record.add_snapshot(vec![1; 4], &demo(Some(40.0), Gender::Unknown, None), None);
        record.add_snapshot(vec![2; 4], &demo(None, Gender::Unknown, None), None);

        assert_relative_eq!(record.mean_age().unwrap(), 30.0);
    }

    #[test]
    fn test_gender_confidence_only_over_definite_samples() {
        let mut record = FaceRecord::new(vec![0; 4], &demo(None, Gender::Male, Some(0.8)), None);
        // Unknown gender: confidence must not enter the aggregate.
        record.add_snapshot(vec![1; 4], &demo(None, Gender::Unknown, Some(0.1)), None);
        record.add_snapshot(vec![2; 4], &demo(None, Gender::Male, Some(0.6)), None);

        assert_relative_eq!(record.mean_gender_confidence().unwrap(), 0.7);
        assert_eq!(record.gender(), Gender::Male);
    }

    #[test]
    fn test_gender_majority_and_tie() {
        let mut record = FaceRecord::new(vec![0; 4], &demo(None, Gender::Female, Some(0.9)), None);
        assert_eq!(record.gender(), Gender::Female);

        record.add_snapshot(vec![1; 4], &demo(None, Gender::Male, Some(0.9)), None);
        assert_eq!(record.gender(), Gender::Unknown);
    }

    #[test]
    fn test_similarity_is_max_over_snapshots() {
        let mut record = FaceRecord::new(vec![9, 9, 9, 9], &DemographicEstimate::unknown(), None);
        record.add_snapshot(vec![1, 2, 3, 4], &DemographicEstimate::unknown(), None);
        record.add_snapshot(vec![5, 6, 7, 8], &DemographicEstimate::unknown(), None);

        let (similarity, index) = record
            .similarity_to(&ExactMatcher, &[1, 2, 3, 4])
            .unwrap();
        assert_relative_eq!(similarity, 1.0);
        assert_eq!(index, 1);
    }

    #[test]
    fn test_merge_appends_snapshots_keeps_aggregates() {
        let mut target = FaceRecord::new(vec![0; 4], &demo(Some(30.0), Gender::Male, Some(0.9)), None);
        target.set_name(Some("Ada".into()));

        let mut other = FaceRecord::new(vec![1; 4], &demo(Some(70.0), Gender::Female, Some(0.4)), None);
        other.set_name(Some("Bob".into()));
        other.add_snapshot(vec![2; 4], &DemographicEstimate::unknown(), None);

        target.merge(other);

        assert_eq!(target.snapshots().len(), 3);
        assert_eq!(target.name(), Some("Ada"));
        assert_relative_eq!(target.mean_age().unwrap(), 30.0);
        assert_eq!(target.gender(), Gender::Male);
    }

    #[test]
    fn test_template_validity_is_fixed_length() {
        assert!(FaceRecord::is_valid_template(&[0; 4], 4));
        assert!(!FaceRecord::is_valid_template(&[0; 3], 4));
        assert!(!FaceRecord::is_valid_template(&[], 4));
    }
}
