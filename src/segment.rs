//! Segment schedule, artifact naming and progress records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// How a run is cut into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    segments: u64,
    steps_per_segment: u64,
    dump_every: u64,
}

impl SegmentPlan {
    pub fn new(segments: u64, steps_per_segment: u64, dump_every: u64) -> Result<SegmentPlan, Error> {
        if segments == 0 {
            return Err(Error::config("segment count must be at least 1"));
        }
        if steps_per_segment == 0 {
            return Err(Error::config("steps per segment must be at least 1"));
        }
        if dump_every == 0 {
            return Err(Error::config("dump cadence must be at least 1"));
        }
        if segments.checked_mul(steps_per_segment).is_none() {
            return Err(Error::config("total step count overflows"));
        }
        Ok(SegmentPlan {
            segments,
            steps_per_segment,
            dump_every,
        })
    }

    pub fn segments(&self) -> u64 {
        self.segments
    }

    pub fn steps_per_segment(&self) -> u64 {
        self.steps_per_segment
    }

    pub fn dump_every(&self) -> u64 {
        self.dump_every
    }

    pub fn total_steps(&self) -> u64 {
        self.segments * self.steps_per_segment
    }

    /// Frames each segment's artifact will hold. Steps past the last full
    /// cadence window are not dumped.
    pub fn frames_per_segment(&self) -> u64 {
        self.steps_per_segment / self.dump_every
    }
}

/// Deterministic `prefix + index + suffix` artifact names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpNaming {
    pub prefix: String,
    pub suffix: String,
}

impl Default for DumpNaming {
    fn default() -> Self {
        DumpNaming {
            prefix: "dump_".to_string(),
            suffix: ".trj".to_string(),
        }
    }
}

impl DumpNaming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        DumpNaming {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn name(&self, segment: u64) -> String {
        format!("{}{}{}", self.prefix, segment, self.suffix)
    }
}

/// Emitted once per completed segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub segment: u64,
    pub artifact: String,
    pub frames: u64,
}

impl fmt::Display for ProgressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Iteration {} completed, dump file {} written.",
            self.segment, self.artifact
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_sized_plans_are_rejected() {
        assert!(SegmentPlan::new(0, 10, 1).is_err());
        assert!(SegmentPlan::new(3, 0, 1).is_err());
        assert!(SegmentPlan::new(3, 10, 0).is_err());
        assert!(SegmentPlan::new(u64::MAX, 2, 1).is_err());
    }

    #[test]
    fn plan_totals() {
        let plan = SegmentPlan::new(3, 10_000, 10_000).unwrap();
        assert_eq!(plan.total_steps(), 30_000);
        assert_eq!(plan.frames_per_segment(), 1);

        let ragged = SegmentPlan::new(2, 25_000, 10_000).unwrap();
        assert_eq!(ragged.frames_per_segment(), 2);
    }

    #[test]
    fn default_naming_matches_dump_convention() {
        let naming = DumpNaming::default();
        assert_eq!(naming.name(1), "dump_1.trj");
        assert_eq!(naming.name(12), "dump_12.trj");
    }

    #[test]
    fn progress_line() {
        let record = ProgressRecord {
            segment: 2,
            artifact: "dump_2.trj".into(),
            frames: 1,
        };
        assert_eq!(
            record.to_string(),
            "Iteration 2 completed, dump file dump_2.trj written."
        );
    }

    proptest! {
        #[test]
        fn naming_is_pure(index in 1u64..1_000_000, prefix in "[a-z_]{0,8}", suffix in "\\.[a-z]{1,5}") {
            let naming = DumpNaming::new(prefix, suffix);
            prop_assert_eq!(naming.name(index), naming.name(index));
        }

        #[test]
        fn distinct_indices_get_distinct_names(a in 1u64..10_000, b in 1u64..10_000) {
            prop_assume!(a != b);
            let naming = DumpNaming::default();
            prop_assert_ne!(naming.name(a), naming.name(b));
        }
    }
}
