//! Accept/reject policy for a single assessed candidate.
//!
//! Checks run in a fixed order and stop at the first failure. Geography is
//! judged before latency, so a candidate outside the target countries is
//! rejected without a probe ever having been run.

use std::fmt;

use crate::types::{PeerAssessment, SearchCriteria};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    LocationUnknown,
    NotInTargetCountries,
    Unreachable,
    LatencyExceedsThreshold,
}

impl RejectReason {
    /// Rejections decided by location alone; no latency probe can change them.
    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::LocationUnknown | Self::NotInTargetCountries)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocationUnknown => "location unknown",
            Self::NotInTargetCountries => "not in target countries",
            Self::Unreachable => "unreachable",
            Self::LatencyExceedsThreshold => "latency exceeds threshold",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Accept => "accepted",
            Self::Reject(reason) => reason.as_str(),
        }
    }
}

/// Judge one assessment against the criteria. Pure: same inputs, same verdict.
pub fn evaluate(assessment: &PeerAssessment, criteria: &SearchCriteria) -> Verdict {
    let Some(country) = &assessment.country else {
        return Verdict::Reject(RejectReason::LocationUnknown);
    };
    if !criteria.is_target_country(country) {
        return Verdict::Reject(RejectReason::NotInTargetCountries);
    }

    let Some(latency) = assessment.latency else {
        return Verdict::Reject(RejectReason::Unreachable);
    };
    if latency > criteria.max_latency() {
        return Verdict::Reject(RejectReason::LatencyExceedsThreshold);
    }

    Verdict::Accept
}
