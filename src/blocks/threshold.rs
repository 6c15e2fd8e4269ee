use std::str::FromStr;
use log::warn;
use thiserror::Error;

/// Named distances offered by the motion detector's hat blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceBucket {
    Pencil,
    Notebook,
    Desk,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown distance value: {0}")]
pub struct UnknownBucket(pub String);

impl DistanceBucket {
    pub const ALL: [DistanceBucket; 3] = [DistanceBucket::Pencil, DistanceBucket::Notebook, DistanceBucket::Desk];

    /// Menu value of this bucket.
    pub fn value(self) -> &'static str {
        match self {
            DistanceBucket::Pencil => "pencil",
            DistanceBucket::Notebook => "notebook",
            DistanceBucket::Desk => "desk",
        }
    }

    /// Distance (display units, meters × 100) the bucket stands for.
    pub fn threshold(self) -> i64 {
        match self {
            DistanceBucket::Pencil => 19,
            DistanceBucket::Notebook => 38,
            DistanceBucket::Desk => 100,
        }
    }
}

impl FromStr for DistanceBucket {
    type Err = UnknownBucket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistanceBucket::ALL.into_iter()
            .find(|bucket| bucket.value() == s)
            .ok_or_else(|| UnknownBucket(s.to_string()))
    }
}

/// `distance <= bucket`. Unknown buckets are logged and evaluate to false.
pub fn closer_than(distance: i64, bucket: &str) -> bool {
    match bucket.parse::<DistanceBucket>() {
        Ok(bucket) => distance <= bucket.threshold(),
        Err(err) => {
            warn!("{} in whenCloserThan", err);
            false
        },
    }
}

/// `distance >= bucket`. Unknown buckets are logged and evaluate to false.
pub fn farther_than(distance: i64, bucket: &str) -> bool {
    match bucket.parse::<DistanceBucket>() {
        Ok(bucket) => distance >= bucket.threshold(),
        Err(err) => {
            warn!("{} in whenFartherThan", err);
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_inclusive_both_ways() {
        assert!(closer_than(38, "notebook"));
        assert!(farther_than(38, "notebook"));
        assert!(!closer_than(39, "notebook"));
        assert!(!farther_than(37, "notebook"));
    }

    #[test]
    fn buckets() {
        assert!(closer_than(19, "pencil"));
        assert!(!closer_than(20, "pencil"));
        assert!(farther_than(100, "desk"));
        assert!(!farther_than(99, "desk"));
        // a disconnected detector reads 0, which is closer than everything
        assert!(DistanceBucket::ALL.iter().all(|bucket| closer_than(0, bucket.value())));
    }

    #[test]
    fn unknown_bucket_is_false_both_ways() {
        assert!(!closer_than(0, "bookshelf"));
        assert!(!farther_than(1000, "bookshelf"));
        assert_eq!("bookshelf".parse::<DistanceBucket>(), Err(UnknownBucket("bookshelf".to_string())));
    }
}
