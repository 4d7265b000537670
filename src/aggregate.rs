use chrono::{Duration, NaiveDate, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::grading::{grade_for, Grade};
use crate::models::{AttendanceRecord, AttendanceStatus, ScoreRecord};

/// Integer division rounding half away from zero. `den` must be positive.
fn div_round(num: i128, den: i128) -> i128 {
    let quotient = num / den;
    if 2 * (num % den).abs() >= den {
        quotient + num.signum()
    } else {
        quotient
    }
}

/// Marks and percentages carry two decimals; this recovers them exactly.
fn to_hundredths(value: f64) -> i128 {
    (value * 100.0).round() as i128
}

fn from_scaled(value: i128, places: u32) -> f64 {
    value as f64 / 10f64.powi(places as i32)
}

/// Rounds a two-decimal value half away from zero to `places` decimals
/// (at most two). Ties are decided on the decimal value, not its binary
/// approximation.
pub fn round_to(value: f64, places: u32) -> f64 {
    let places = places.min(2);
    from_scaled(
        div_round(to_hundredths(value), 10i128.pow(2 - places)),
        places,
    )
}

/// Insertion-ordered map keyed by subject name. Keys appear in the order
/// they were first seen, which keeps downstream suggestion order stable.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for SubjectMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> SubjectMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, subject: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(name, _)| name == subject)
            .map(|(_, value)| value)
    }

    pub fn entry_or_insert_with(&mut self, subject: &str, default: impl FnOnce() -> T) -> &mut T {
        let idx = match self.entries.iter().position(|(name, _)| name == subject) {
            Some(idx) => idx,
            None => {
                self.entries.push((subject.to_string(), default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    /// Sets `subject` to `value`, keeping its original position if present.
    pub fn insert(&mut self, subject: &str, value: T) {
        match self.entries.iter_mut().find(|(name, _)| name == subject) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((subject.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn map_values<U>(self, mut f: impl FnMut(T) -> U) -> SubjectMap<U> {
        SubjectMap {
            entries: self
                .entries
                .into_iter()
                .map(|(name, value)| (name, f(value)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for SubjectMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut map = SubjectMap::new();
        for (name, value) in iter {
            map.insert(&name, value);
        }
        map
    }
}

impl<T: Serialize> Serialize for SubjectMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Score as a percentage of the maximum, two decimals.
pub fn percentage(record: &ScoreRecord) -> f64 {
    score_percentage(record.obtained_score, record.max_score)
}

pub fn score_percentage(obtained: f64, max: f64) -> f64 {
    let max = to_hundredths(max);
    if max <= 0 {
        return 0.0;
    }
    from_scaled(div_round(to_hundredths(obtained).saturating_mul(10_000), max), 2)
}

/// Percentage for an assessment submission; ungraded counts as zero.
pub fn submission_percentage(score: Option<f64>, max_score: i32) -> f64 {
    match score {
        Some(score) => score_percentage(score, f64::from(max_score)),
        None => 0.0,
    }
}

/// Mean of two-decimal percentages rounded to `places` (at most two).
/// Summing in hundredths keeps the result independent of input order.
fn mean(values: &[f64], places: u32) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let places = places.min(2);
    let hundredths: i128 = values.iter().map(|value| to_hundredths(*value)).sum();
    from_scaled(
        div_round(hundredths * 10i128.pow(places), values.len() as i128 * 100),
        places,
    )
}

/// Mean of per-record percentages; zero when there are no records.
pub fn overall_average(records: &[ScoreRecord]) -> f64 {
    let percentages: Vec<f64> = records.iter().map(percentage).collect();
    mean(&percentages, 2)
}

pub fn per_subject_average(records: &[ScoreRecord]) -> SubjectMap<f64> {
    group_scores(records).map_values(|group| mean(&group, 2))
}

fn group_scores(records: &[ScoreRecord]) -> SubjectMap<Vec<f64>> {
    let mut groups: SubjectMap<Vec<f64>> = SubjectMap::new();
    for record in records {
        groups
            .entry_or_insert_with(&record.subject_name, Vec::new)
            .push(percentage(record));
    }
    groups
}

/// Present / total counts for a set of attendance records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceTally {
    pub total: usize,
    pub present: usize,
}

impl AttendanceTally {
    fn add(&mut self, status: AttendanceStatus) {
        self.total += 1;
        if status == AttendanceStatus::Present {
            self.present += 1;
        }
    }

    /// Present share as a percentage, one decimal; zero when empty.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        from_scaled(div_round(self.present as i128 * 1000, self.total as i128), 1)
    }
}

pub fn attendance_tally(records: &[AttendanceRecord]) -> AttendanceTally {
    let mut tally = AttendanceTally::default();
    for record in records {
        tally.add(record.status);
    }
    tally
}

/// Only `present` counts toward the rate; late and excused do not.
pub fn attendance_rate(records: &[AttendanceRecord]) -> f64 {
    attendance_tally(records).rate()
}

pub fn attendance_tally_by_subject(records: &[AttendanceRecord]) -> SubjectMap<AttendanceTally> {
    let mut tallies: SubjectMap<AttendanceTally> = SubjectMap::new();
    for record in records {
        tallies
            .entry_or_insert_with(&record.subject_name, AttendanceTally::default)
            .add(record.status);
    }
    tallies
}

pub fn attendance_rate_by_subject(records: &[AttendanceRecord]) -> SubjectMap<f64> {
    attendance_tally_by_subject(records).map_values(|tally| tally.rate())
}

/// One point of a score trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub pct: f64,
    pub subject: String,
}

impl From<&ScoreRecord> for TrendPoint {
    fn from(record: &ScoreRecord) -> Self {
        TrendPoint {
            date: record.date,
            pct: percentage(record),
            subject: record.subject_name.clone(),
        }
    }
}

/// Records in ascending date order, cut to the first `limit`.
///
/// This keeps the *earliest* records, not the most recent ones. Charts
/// built on it depend on that, so it must not be flipped to a
/// descending-then-limit selection.
pub fn trend_series(records: &[ScoreRecord], limit: usize) -> Vec<TrendPoint> {
    let mut sorted: Vec<&ScoreRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.date);
    sorted
        .into_iter()
        .take(limit)
        .map(TrendPoint::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectStats {
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub grade: Grade,
    pub count: usize,
}

/// Per-subject average, best, worst (one decimal) and the grade of the
/// first record seen for the subject. Callers pass newest-first records so
/// that grade reflects the latest mark.
pub fn subject_stats(records: &[ScoreRecord]) -> SubjectMap<SubjectStats> {
    group_scores(records).map_values(|group| {
        let max = group.iter().copied().fold(f64::MIN, f64::max);
        let min = group.iter().copied().fold(f64::MAX, f64::min);
        SubjectStats {
            avg: mean(&group, 1),
            max: round_to(max, 1),
            min: round_to(min, 1),
            grade: grade_for(group[0]),
            count: group.len(),
        }
    })
}

/// Sorts by average descending, ties keep input order, and truncates.
pub fn rank_by_average<T>(mut entries: Vec<(T, f64)>, limit: usize) -> Vec<(T, f64)> {
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries.truncate(limit);
    entries
}

pub fn cutoff_date(since_days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(since_days.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn score(subject: &str, obtained: f64, max: f64, day: u32) -> ScoreRecord {
        ScoreRecord {
            subject_name: subject.to_string(),
            obtained_score: obtained,
            max_score: max,
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        }
    }

    fn attendance(subject: &str, status: AttendanceStatus, day: u32) -> AttendanceRecord {
        AttendanceRecord {
            subject_name: subject.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            status,
        }
    }

    #[test]
    fn percentage_rounds_to_two_places() {
        assert_eq!(percentage(&score("Math", 1.0, 3.0, 1)), 33.33);
        assert_eq!(percentage(&score("Math", 2.0, 3.0, 1)), 66.67);
        assert_eq!(percentage(&score("Math", 45.5, 50.0, 1)), 91.0);
    }

    #[test]
    fn percentage_ties_round_away_from_zero() {
        assert_eq!(percentage(&score("Math", 0.29, 8.0, 1)), 3.63);
        assert_eq!(percentage(&score("Math", 0.57, 8.0, 1)), 7.13);
        assert_eq!(percentage(&score("Math", 1.13, 8.0, 1)), 14.13);
        assert_eq!(percentage(&score("Math", 2.0, 0.0, 1)), 0.0);
    }

    #[test]
    fn one_place_rounding_breaks_decimal_ties_upward() {
        assert_eq!(round_to(72.45, 1), 72.5);
        assert_eq!(round_to(0.05, 1), 0.1);
        assert_eq!(round_to(-2.25, 1), -2.3);
        assert_eq!(round_to(89.95, 1), 90.0);
    }

    #[test]
    fn attendance_rate_ties_round_up() {
        let mut records = vec![attendance("Math", AttendanceStatus::Present, 1)];
        records.extend((0..79).map(|_| attendance("Math", AttendanceStatus::Absent, 2)));
        assert_eq!(attendance_rate(&records), 1.3);
    }

    #[test]
    fn averages_round_exact_decimal_ties() {
        let records = vec![score("Math", 72.45, 100.0, 1), score("Math", 72.46, 100.0, 2)];
        assert_eq!(overall_average(&records), 72.46);
        let stats = subject_stats(&records);
        assert_eq!(stats.get("Math").unwrap().avg, 72.5);
    }

    #[test]
    fn overall_average_is_mean_of_percentages() {
        let records = vec![score("Math", 80.0, 100.0, 1), score("Math", 60.0, 100.0, 2)];
        assert_eq!(overall_average(&records), 70.0);
    }

    #[test]
    fn overall_average_of_nothing_is_zero() {
        assert_eq!(overall_average(&[]), 0.0);
    }

    #[test]
    fn per_subject_average_groups_in_first_seen_order() {
        let records = vec![
            score("Physics", 40.0, 50.0, 1),
            score("Math", 90.0, 100.0, 2),
            score("Physics", 30.0, 50.0, 3),
        ];
        let averages = per_subject_average(&records);
        assert_eq!(
            averages.iter().map(|(subject, _)| subject).collect::<Vec<_>>(),
            vec!["Physics", "Math"]
        );
        assert_eq!(averages.get("Physics"), Some(&70.0));
        assert_eq!(averages.get("Math"), Some(&90.0));
    }

    #[test]
    fn attendance_rate_counts_only_present() {
        let records = vec![
            attendance("Math", AttendanceStatus::Present, 1),
            attendance("Math", AttendanceStatus::Present, 2),
            attendance("Math", AttendanceStatus::Absent, 3),
            attendance("Math", AttendanceStatus::Present, 4),
        ];
        assert_eq!(attendance_rate(&records), 75.0);

        let with_late = vec![
            attendance("Math", AttendanceStatus::Present, 1),
            attendance("Math", AttendanceStatus::Late, 2),
            attendance("Math", AttendanceStatus::Excused, 3),
        ];
        assert_eq!(attendance_rate(&with_late), 33.3);
    }

    #[test]
    fn attendance_rate_of_nothing_is_zero() {
        assert_eq!(attendance_rate(&[]), 0.0);
        assert!(attendance_rate_by_subject(&[]).is_empty());
    }

    #[test]
    fn attendance_rate_by_subject_splits_groups() {
        let records = vec![
            attendance("Math", AttendanceStatus::Present, 1),
            attendance("English", AttendanceStatus::Absent, 1),
            attendance("Math", AttendanceStatus::Absent, 2),
            attendance("English", AttendanceStatus::Present, 2),
            attendance("English", AttendanceStatus::Present, 3),
        ];
        let rates = attendance_rate_by_subject(&records);
        assert_eq!(rates.get("Math"), Some(&50.0));
        assert_eq!(rates.get("English"), Some(&66.7));

        let tallies = attendance_tally_by_subject(&records);
        assert_eq!(
            tallies.get("English"),
            Some(&AttendanceTally {
                total: 3,
                present: 2
            })
        );
    }

    #[test]
    fn trend_keeps_earliest_records() {
        let records = vec![
            score("Math", 50.0, 100.0, 20),
            score("Math", 60.0, 100.0, 5),
            score("Physics", 70.0, 100.0, 10),
            score("Physics", 80.0, 100.0, 1),
        ];
        let trend = trend_series(&records, 2);
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(trend[0].pct, 80.0);
        assert_eq!(trend[0].subject, "Physics");
        assert_eq!(trend[1].date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn trend_serialises_with_chart_keys() {
        let trend = trend_series(&[score("Math", 45.0, 50.0, 9)], 12);
        let json = serde_json::to_value(&trend).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "date": "2024-03-09", "pct": 90.0, "subject": "Math" }])
        );
    }

    #[test]
    fn subject_stats_uses_first_record_for_grade() {
        let records = vec![
            score("Math", 55.0, 100.0, 9),
            score("Math", 95.0, 100.0, 2),
            score("Math", 75.0, 100.0, 1),
        ];
        let stats = subject_stats(&records);
        let math = stats.get("Math").unwrap();
        assert_eq!(math.avg, 75.0);
        assert_eq!(math.max, 95.0);
        assert_eq!(math.min, 55.0);
        assert_eq!(math.grade, Grade::C);
        assert_eq!(math.count, 3);
    }

    #[test]
    fn ranking_sorts_descending_and_truncates() {
        let ranked = rank_by_average(
            vec![("ana", 71.0), ("raj", 88.5), ("kim", 71.0), ("lee", 93.2)],
            3,
        );
        assert_eq!(
            ranked,
            vec![("lee", 93.2), ("raj", 88.5), ("ana", 71.0)]
        );
    }

    #[test]
    fn ungraded_submission_is_zero() {
        assert_eq!(submission_percentage(None, 50), 0.0);
        assert_eq!(submission_percentage(Some(42.5), 50), 85.0);
    }

    #[test]
    fn cutoff_date_respects_since_days() {
        let cutoff = cutoff_date(7);
        assert_eq!(cutoff, Utc::now().date_naive() - Duration::days(7));
    }

    fn arb_score() -> impl Strategy<Value = ScoreRecord> {
        (
            prop::sample::select(vec!["Math", "Physics", "English", "Chemistry"]),
            1u32..=100,
            1u32..=28,
            0.0f64..=1.0,
        )
            .prop_map(|(subject, max, day, ratio)| {
                let max = f64::from(max);
                score(subject, (max * ratio * 100.0).round() / 100.0, max, day)
            })
    }

    proptest! {
        #[test]
        fn overall_average_stays_in_range(records in prop::collection::vec(arb_score(), 1..40)) {
            let avg = overall_average(&records);
            prop_assert!((0.0..=100.0).contains(&avg));
        }

        #[test]
        fn grouping_ignores_input_order(
            (records, shuffled) in prop::collection::vec(arb_score(), 0..30)
                .prop_flat_map(|records| {
                    let shuffled = Just(records.clone()).prop_shuffle();
                    (Just(records), shuffled)
                })
        ) {
            let a = per_subject_average(&records);
            let b = per_subject_average(&shuffled);
            prop_assert_eq!(a.iter().count(), b.iter().count());
            for (subject, avg) in a.iter() {
                let other = b.get(subject).copied().unwrap_or(f64::NAN);
                prop_assert!((avg - other).abs() < 1e-9);
            }
        }

        #[test]
        fn trend_is_bounded_and_sorted(
            records in prop::collection::vec(arb_score(), 0..40),
            limit in 0usize..25,
        ) {
            let trend = trend_series(&records, limit);
            prop_assert!(trend.len() <= limit);
            prop_assert!(trend.windows(2).all(|pair| pair[0].date <= pair[1].date));
        }
    }
}
