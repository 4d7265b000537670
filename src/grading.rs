use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Letter grade on the fixed ladder, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    APlus,
    A,
    BPlus,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub const ALL: [Grade; 7] = [
        Grade::APlus,
        Grade::A,
        Grade::BPlus,
        Grade::B,
        Grade::C,
        Grade::D,
        Grade::F,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Maps a percentage onto the grade ladder. Inputs outside [0, 100] keep
/// following the same thresholds; NaN compares false everywhere and lands on F.
pub fn grade_for(percentage: f64) -> Grade {
    match percentage {
        p if p >= 90.0 => Grade::APlus,
        p if p >= 80.0 => Grade::A,
        p if p >= 70.0 => Grade::BPlus,
        p if p >= 60.0 => Grade::B,
        p if p >= 50.0 => Grade::C,
        p if p >= 40.0 => Grade::D,
        _ => Grade::F,
    }
}

/// Count of records per grade. Every bucket is present, zero-filled, and
/// serialises as an ordered `{"A+": n, ..., "F": n}` object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeDistribution {
    counts: [usize; 7],
}

impl GradeDistribution {
    pub fn count(&self, grade: Grade) -> usize {
        self.counts[grade.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Grade, usize)> + '_ {
        Grade::ALL.iter().map(move |grade| (*grade, self.count(*grade)))
    }
}

impl Serialize for GradeDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Grade::ALL.len()))?;
        for (grade, count) in self.iter() {
            map.serialize_entry(grade.as_str(), &count)?;
        }
        map.end()
    }
}

pub fn grade_distribution<I>(percentages: I) -> GradeDistribution
where
    I: IntoIterator<Item = f64>,
{
    let mut distribution = GradeDistribution::default();
    for pct in percentages {
        distribution.counts[grade_for(pct).index()] += 1;
    }
    distribution
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ladder_uses_inclusive_lower_bounds() {
        assert_eq!(grade_for(100.0), Grade::APlus);
        assert_eq!(grade_for(90.0), Grade::APlus);
        assert_eq!(grade_for(89.99), Grade::A);
        assert_eq!(grade_for(80.0), Grade::A);
        assert_eq!(grade_for(70.0), Grade::BPlus);
        assert_eq!(grade_for(60.0), Grade::B);
        assert_eq!(grade_for(50.0), Grade::C);
        assert_eq!(grade_for(40.0), Grade::D);
        assert_eq!(grade_for(39.99), Grade::F);
        assert_eq!(grade_for(0.0), Grade::F);
    }

    #[test]
    fn out_of_range_inputs_follow_the_same_ladder() {
        assert_eq!(grade_for(140.0), Grade::APlus);
        assert_eq!(grade_for(-5.0), Grade::F);
        assert_eq!(grade_for(f64::NAN), Grade::F);
    }

    #[test]
    fn distribution_keeps_every_bucket() {
        let dist = grade_distribution([95.0, 91.0, 72.0, 10.0]);
        assert_eq!(dist.count(Grade::APlus), 2);
        assert_eq!(dist.count(Grade::BPlus), 1);
        assert_eq!(dist.count(Grade::F), 1);
        assert_eq!(dist.count(Grade::C), 0);
        assert_eq!(dist.total(), 4);

        let json = serde_json::to_string(&dist).unwrap();
        assert_eq!(
            json,
            r#"{"A+":2,"A":0,"B+":1,"B":0,"C":0,"D":0,"F":1}"#
        );
    }

    #[test]
    fn empty_distribution_is_all_zero() {
        let dist = grade_distribution(Vec::new());
        assert_eq!(dist.total(), 0);
        assert!(dist.iter().all(|(_, count)| count == 0));
    }

    proptest! {
        #[test]
        fn higher_percentage_never_grades_lower(a in -20.0f64..120.0, b in -20.0f64..120.0) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            // Grade orders best first, so a better grade compares smaller.
            prop_assert!(grade_for(high) <= grade_for(low));
        }
    }
}
