// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{
    Ballot, CastVote, Lww, MemberId, MemberIdentity, Motion, QueueEntry, Resolution,
    SessionRecord, Sitting, SpeakerGrant, Stamp,
};
use serde::{Deserialize, Serialize};

/// One field-scoped write. Registers carry their own stamp; the grow-only
/// records (roster entries, resolutions, minutes) are keyed by id and never
/// change once written.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Write {
    Enroll { identity: MemberIdentity },
    Sitting { register: Lww<Sitting> },
    Ballot { register: Lww<Option<Ballot>> },
    Speaker { register: Lww<Option<SpeakerGrant>> },
    Presence { member: MemberId, register: Lww<bool> },
    Vote { member: MemberId, register: Lww<Option<CastVote>> },
    Queue { member: MemberId, register: Lww<Option<QueueEntry>> },
    // The whole motion travels with every status change, so a status
    // arriving before the motion it belongs to can never be lost.
    Motion { motion: Motion },
    Resolution { resolution: Resolution },
    Minutes { record: SessionRecord },
}

impl Write {
    /// The stamp of the write, if it has one. Roster entries are
    /// administrative and unstamped.
    pub fn stamp(&self) -> Option<&Stamp> {
        match self {
            Write::Enroll { .. } => None,
            Write::Sitting { register } => Some(&register.stamp),
            Write::Ballot { register } => Some(&register.stamp),
            Write::Speaker { register } => Some(&register.stamp),
            Write::Presence { register, .. } => Some(&register.stamp),
            Write::Vote { register, .. } => Some(&register.stamp),
            Write::Queue { register, .. } => Some(&register.stamp),
            Write::Motion { motion } => Some(&motion.status.stamp),
            Write::Resolution { resolution } => Some(&resolution.stamp),
            Write::Minutes { record } => Some(&record.closed),
        }
    }

    /// Fields only someone chairing the sitting may write.
    pub fn is_presiding_only(&self) -> bool {
        match self {
            Write::Sitting { .. }
            | Write::Ballot { .. }
            | Write::Speaker { .. }
            | Write::Presence { .. }
            | Write::Resolution { .. }
            | Write::Minutes { .. } => true,
            Write::Enroll { .. }
            | Write::Vote { .. }
            | Write::Queue { .. }
            | Write::Motion { .. } => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Write::Enroll { identity } => format!("enroll {}", identity.id),
            Write::Sitting { register } => format!("sitting @{}", register.stamp),
            Write::Ballot { register } => format!("ballot @{}", register.stamp),
            Write::Speaker { register } => format!("speaker @{}", register.stamp),
            Write::Presence { member, register } => {
                format!("presence of {} @{}", member, register.stamp)
            }
            Write::Vote { member, register } => format!("vote of {} @{}", member, register.stamp),
            Write::Queue { member, register } => {
                format!("queue slot of {} @{}", member, register.stamp)
            }
            Write::Motion { motion } => format!("motion {} @{}", motion.id, motion.status.stamp),
            Write::Resolution { resolution } => format!("resolution {}", resolution.case_number),
            Write::Minutes { record } => format!("minutes of sitting {}", record.sitting),
        }
    }
}

/// A set of writes published together. Whole-snapshot transports translate
/// to and from this form at their boundary, see `Snapshot::decompose`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Patch {
    pub writes: Vec<Write>,
}

impl Patch {
    pub fn new(writes: Vec<Write>) -> Self {
        Patch { writes }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Greatest stamp carried by any write in the patch.
    pub fn high_water(&self) -> Option<&Stamp> {
        self.writes.iter().filter_map(Write::stamp).max()
    }

    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> crate::Result<Patch> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl std::iter::FromIterator<Write> for Patch {
    fn from_iter<I: IntoIterator<Item = Write>>(iter: I) -> Self {
        Patch::new(iter.into_iter().collect())
    }
}
