// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{
    Ballot, FloorState, Lww, MemberId, MemberIdentity, MemberRecord, Motion, MotionId,
    MotionStatus,     NominalVote, Patch, Resolution, SessionRecord, Sitting, SpeakerGrant, Stamp, Tally,
    VoteChoice, Write,
};
use im::OrdMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A client's copy of the session.
///
/// Snapshots are values: nothing here mutates in place, `apply` and the
/// reducer return a new snapshot that shares structure with the old one
/// through the persistent `im` maps, so a renderer can keep reading an old
/// snapshot while the dispatch loop builds the next.
///
/// Several raw registers can hold values that are no longer live (a vote
/// from an earlier ballot, a queue slot from an earlier sitting, a grant
/// that raced a close). Every read accessor filters those out, so the
/// domain invariants hold for anything read through this API regardless of
/// the order in which writes were merged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub(crate) members: OrdMap<MemberId, MemberRecord>,
    pub(crate) sitting: Lww<Sitting>,
    pub(crate) ballot: Lww<Option<Ballot>>,
    pub(crate) speaker: Lww<Option<SpeakerGrant>>,
    pub(crate) motions: OrdMap<MotionId, Motion>,
    pub(crate) resolutions: OrdMap<String, Resolution>,
    // Keyed by the sitting stamp's display form; JSON map keys are strings.
    pub(crate) minutes: OrdMap<String, SessionRecord>,
    pub(crate) high_water: Stamp,
}

impl Snapshot {
    pub fn new() -> Self {
        Snapshot::default()
    }

    /// A fresh snapshot holding only the given roster.
    pub fn with_roster<I: IntoIterator<Item = MemberIdentity>>(roster: I) -> Self {
        let patch: Patch = roster
            .into_iter()
            .map(|identity| Write::Enroll { identity })
            .collect();
        Snapshot::new().apply(&patch).0
    }

    /// Greatest stamp of any write merged so far. Two snapshots that have
    /// absorbed the same writes have the same version, whatever the order.
    pub fn version(&self) -> &Stamp {
        &self.high_water
    }

    // Sitting.

    pub fn sitting(&self) -> &Sitting {
        &self.sitting.value
    }

    pub fn is_open(&self) -> bool {
        self.sitting.value.is_open()
    }

    /// Identity of the current sitting, if the chamber is sitting.
    pub fn sitting_stamp(&self) -> Option<&Stamp> {
        if self.is_open() {
            Some(&self.sitting.stamp)
        } else {
            None
        }
    }

    fn is_current_sitting(&self, stamp: &Stamp) -> bool {
        self.sitting_stamp() == Some(stamp)
    }

    // Members and attendance.

    /// An enrolled member. Writes addressed to an id the roster never
    /// delivered are kept, but the id does not read as a member.
    pub fn member(&self, id: &MemberId) -> Option<&MemberRecord> {
        self.members.get(id).filter(|m| m.enrolled)
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberRecord> {
        self.members.values().filter(|m| m.enrolled)
    }

    pub fn total_members(&self) -> usize {
        self.members().count()
    }

    pub fn is_present(&self, id: &MemberId) -> bool {
        self.member(id).map_or(false, |m| m.present.value)
    }

    pub fn present_count(&self) -> usize {
        self.members().filter(|m| m.present.value).count()
    }

    /// Strictly more than half of the roster is present.
    pub fn quorum(&self) -> bool {
        self.present_count() * 2 > self.total_members()
    }

    // Ballot and votes.

    pub fn ballot(&self) -> Option<&Ballot> {
        self.ballot
            .value
            .as_ref()
            .filter(|b| self.is_current_sitting(&b.sitting))
    }

    /// The member's vote in the open ballot, if any.
    pub fn current_vote(&self, id: &MemberId) -> Option<VoteChoice> {
        let ballot = self.ballot()?;
        let member = self.member(id)?;
        match &member.vote.value {
            Some(cast) if cast.case_number == ballot.case_number => Some(cast.choice),
            _ => None,
        }
    }

    /// Live votes of present members, in roster order.
    pub fn nominal_votes(&self) -> Vec<NominalVote> {
        self.members()
            .filter(|m| m.present.value)
            .filter_map(|m| {
                self.current_vote(m.id()).map(|choice| NominalVote {
                    member: m.id().clone(),
                    display_name: m.identity.display_name.clone(),
                    choice,
                })
            })
            .collect()
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for vote in self.nominal_votes() {
            tally.count(vote.choice);
        }
        tally
    }

    // Floor.

    pub fn speaker(&self) -> Option<&MemberId> {
        self.speaker
            .value
            .as_ref()
            .filter(|g| self.is_current_sitting(&g.sitting))
            .map(|g| &g.member)
    }

    fn is_queued(&self, member: &MemberRecord) -> bool {
        match &member.queued.value {
            Some(entry) => self.is_current_sitting(&entry.sitting),
            None => false,
        }
    }

    /// Members waiting for the floor, in the order they asked for it.
    pub fn speaker_queue(&self) -> Vec<MemberId> {
        let speaker = self.speaker();
        self.members()
            .filter(|m| self.is_queued(m) && Some(m.id()) != speaker)
            .sorted_by(|a, b| a.queued.stamp.cmp(&b.queued.stamp))
            .map(|m| m.id().clone())
            .collect()
    }

    pub fn floor_state(&self, id: &MemberId) -> FloorState {
        if self.speaker() == Some(id) {
            return FloorState::Granted;
        }
        match self.member(id) {
            Some(m) if self.is_queued(m) => FloorState::Waiting,
            _ => FloorState::None,
        }
    }

    // Motions and archives.

    pub fn motion(&self, id: &MotionId) -> Option<&Motion> {
        self.motions.get(id)
    }

    pub fn motions(&self) -> impl Iterator<Item = &Motion> {
        self.motions.values()
    }

    /// The status of a motion as the chamber sees it. A motion is only
    /// under debate while the live ballot is about it; a stored debate
    /// status left behind by a ballot that lost a race, or died with its
    /// sitting, reads as pending.
    pub fn motion_status(&self, id: &MotionId) -> Option<MotionStatus> {
        let motion = self.motions.get(id)?;
        match motion.status() {
            MotionStatus::Debate if self.ballot().and_then(|b| b.motion.as_ref()) != Some(id) => {
                Some(MotionStatus::Pending)
            }
            status => Some(status),
        }
    }

    pub fn resolution(&self, case_number: &str) -> Option<&Resolution> {
        self.resolutions.get(case_number)
    }

    /// Resolutions in the order they were recorded.
    pub fn resolutions(&self) -> Vec<&Resolution> {
        self.resolutions
            .values()
            .sorted_by(|a, b| a.stamp.cmp(&b.stamp))
            .collect()
    }

    /// Minutes of closed sittings, oldest first.
    pub fn session_records(&self) -> Vec<&SessionRecord> {
        self.minutes
            .values()
            .sorted_by(|a, b| a.sitting.cmp(&b.sitting))
            .collect()
    }

    // Translation to and from the field-scoped form.

    /// Breaks the snapshot into one write per leaf that has ever been
    /// written. Merging the result into any snapshot is the same as joining
    /// the two snapshots.
    pub fn decompose(&self) -> Patch {
        Snapshot::new().diff(self)
    }

    /// The writes that take `self` to `newer`. Only meaningful when `newer`
    /// descends from `self`, which is how the dispatch loop uses it.
    pub fn diff(&self, newer: &Snapshot) -> Patch {
        let mut writes = Vec::new();
        for (id, record) in newer.members.iter() {
            let old = self.members.get(id);
            let enrolled = old.map_or(false, |o| o.enrolled && o.identity == record.identity);
            if record.enrolled && !enrolled {
                writes.push(Write::Enroll {
                    identity: record.identity.clone(),
                });
            }
            let unwritten = MemberRecord::default();
            let old = old.unwrap_or(&unwritten);
            if old.present != record.present {
                writes.push(Write::Presence {
                    member: id.clone(),
                    register: record.present.clone(),
                });
            }
            if old.vote != record.vote {
                writes.push(Write::Vote {
                    member: id.clone(),
                    register: record.vote.clone(),
                });
            }
            if old.queued != record.queued {
                writes.push(Write::Queue {
                    member: id.clone(),
                    register: record.queued.clone(),
                });
            }
        }
        if self.sitting != newer.sitting {
            writes.push(Write::Sitting {
                register: newer.sitting.clone(),
            });
        }
        if self.ballot != newer.ballot {
            writes.push(Write::Ballot {
                register: newer.ballot.clone(),
            });
        }
        if self.speaker != newer.speaker {
            writes.push(Write::Speaker {
                register: newer.speaker.clone(),
            });
        }
        for (id, motion) in newer.motions.iter() {
            if self.motions.get(id) != Some(motion) {
                writes.push(Write::Motion {
                    motion: motion.clone(),
                });
            }
        }
        for (key, resolution) in newer.resolutions.iter() {
            if self.resolutions.get(key) != Some(resolution) {
                writes.push(Write::Resolution {
                    resolution: resolution.clone(),
                });
            }
        }
        for (key, record) in newer.minutes.iter() {
            if self.minutes.get(key) != Some(record) {
                writes.push(Write::Minutes {
                    record: record.clone(),
                });
            }
        }
        Patch::new(writes)
    }

    // Persistence.

    pub fn serialize(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(json: &str) -> crate::Result<Snapshot> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn roster(n: usize) -> Snapshot {
        Snapshot::with_roster(
            (0..n).map(|i| MemberIdentity::new(format!("m{}", i), format!("Member {}", i), Role::Delegate)),
        )
    }

    fn mark_present(snap: &Snapshot, n: usize) -> Snapshot {
        let patch: Patch = (0..n)
            .map(|i| Write::Presence {
                member: MemberId::new(format!("m{}", i)),
                register: Lww::new(Stamp::new(1, crate::PublisherId::new("chair")), true),
            })
            .collect();
        snap.apply(&patch).0
    }

    #[test]
    fn quorum_is_strict_majority() {
        let snap = roster(24);
        assert_eq!(snap.total_members(), 24);
        assert!(mark_present(&snap, 13).quorum());
        assert!(!mark_present(&snap, 12).quorum());
        assert!(!snap.quorum());
    }

    #[test]
    fn empty_diff_between_equal_snapshots() {
        let snap = mark_present(&roster(3), 2);
        assert!(snap.diff(&snap).is_empty());
    }

    #[test]
    fn decompose_rebuilds_the_snapshot() {
        let snap = mark_present(&roster(5), 3);
        let rebuilt = Snapshot::new().apply(&snap.decompose()).0;
        assert_eq!(rebuilt, snap);
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let snap = mark_present(&roster(4), 4);
        let json = snap.serialize().unwrap();
        let back = Snapshot::deserialize(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn nothing_is_live_while_closed() {
        let snap = roster(2);
        assert!(!snap.is_open());
        assert!(snap.ballot().is_none());
        assert!(snap.speaker().is_none());
        assert!(snap.speaker_queue().is_empty());
        assert_eq!(snap.floor_state(&MemberId::new("m0")), FloorState::None);
    }
}
