// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{Lww, MemberId, Stamp, VoteChoice};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the chamber is sitting. The stamp of the register holding an
/// `Open` value doubles as the identity of that sitting: ballots, queue
/// entries and floor grants all record it, and are only live while it is
/// the current one.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sitting {
    Closed,
    Open { started_at: DateTime<Utc> },
}

impl Default for Sitting {
    fn default() -> Self {
        Sitting::Closed
    }
}

impl Sitting {
    pub fn is_open(&self) -> bool {
        matches!(self, Sitting::Open { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Sitting::Open { started_at } => Some(*started_at),
            Sitting::Closed => None,
        }
    }
}

/// One open voting round.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ballot {
    pub subject: String,
    pub case_number: String,
    pub opened_at: DateTime<Utc>,
    pub sitting: Stamp,
    pub motion: Option<MotionId>,
}

/// Who holds the floor, bound to the sitting the grant was made in.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpeakerGrant {
    pub member: MemberId,
    pub sitting: Stamp,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MotionId(pub String);

impl MotionId {
    pub fn new(id: impl Into<String>) -> Self {
        MotionId(id.into())
    }
}

impl fmt::Display for MotionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionStatus {
    Pending,
    Debate,
    Approved,
    Rejected,
    Archived,
}

impl Default for MotionStatus {
    fn default() -> Self {
        MotionStatus::Pending
    }
}

/// A motion tabled before the chamber. Everything but the status is fixed
/// at submission.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Motion {
    pub id: MotionId,
    pub title: String,
    pub body: String,
    pub proposer: MemberId,
    pub submitted_at: DateTime<Utc>,
    pub status: Lww<MotionStatus>,
}

impl Motion {
    pub fn status(&self) -> MotionStatus {
        self.status.value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Approved => f.write_str("APPROVED"),
            Verdict::Rejected => f.write_str("REJECTED"),
        }
    }
}

/// Counts of the live votes of present members. Always derived, never
/// replicated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tally {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
}

impl Tally {
    pub fn count(&mut self, choice: VoteChoice) {
        match choice {
            VoteChoice::Yes => self.yes += 1,
            VoteChoice::No => self.no += 1,
            VoteChoice::Abstain => self.abstain += 1,
        }
    }

    pub fn cast(&self) -> u32 {
        self.yes + self.no + self.abstain
    }

    /// Strict majority of YES over NO. Abstentions do not enter the
    /// comparison and a tie is a rejection.
    pub fn verdict(&self) -> Verdict {
        if self.yes > self.no {
            Verdict::Approved
        } else {
            Verdict::Rejected
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NominalVote {
    pub member: MemberId,
    pub display_name: String,
    pub choice: VoteChoice,
}

/// Archived outcome of a closed ballot. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub case_number: String,
    pub subject: String,
    pub result: Verdict,
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
    pub recorded_at: DateTime<Utc>,
    pub legal_text: String,
    pub motion: Option<MotionId>,
    pub sitting: Stamp,
    /// Stamp of the action that closed the ballot.
    pub stamp: Stamp,
    pub detail: Vec<NominalVote>,
}

impl Resolution {
    pub fn archive(
        ballot: &Ballot,
        tally: Tally,
        detail: Vec<NominalVote>,
        stamp: Stamp,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let result = tally.verdict();
        let legal_text = format!(
            "RESOLUTION {}. Having put to a nominal vote the matter \"{}\", \
             the chamber records {} in favour, {} against and {} abstentions. \
             The matter is hereby {}.",
            ballot.case_number,
            ballot.subject,
            tally.yes,
            tally.no,
            tally.abstain,
            result
        );
        Resolution {
            case_number: ballot.case_number.clone(),
            subject: ballot.subject.clone(),
            result,
            yes: tally.yes,
            no: tally.no,
            abstain: tally.abstain,
            recorded_at,
            legal_text,
            motion: ballot.motion.clone(),
            sitting: ballot.sitting.clone(),
            stamp,
            detail,
        }
    }
}

/// Minutes of one sitting, appended when it closes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionRecord {
    pub sitting: Stamp,
    pub closed: Stamp,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: DateTime<Utc>,
    pub present: Vec<MemberId>,
    pub absent: Vec<MemberId>,
    pub resolutions: Vec<String>,
}
