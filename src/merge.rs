// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

//! The merge policy: how a write from anywhere is folded into a snapshot.
//!
//! Every register merges as the `max` lattice over `(stamp, value)`, so a
//! write lands only if its stamp is strictly newer than the stored one.
//! Grow-only records merge as a keyed union; should two different records
//! ever share a key, the lesser one is kept on every replica. Each rule is
//! commutative, associative and idempotent, hence so is `apply`: replicas
//! that have seen the same set of writes hold equal snapshots.

use crate::{MemberId, MemberIdentity, MemberRecord, Motion, Patch, Snapshot, Write};
use im::OrdMap;
use std::cmp::Ordering;
use tracing::trace;

/// What happened to the writes of a patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub applied: usize,
    pub stale: usize,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.applied > 0
    }

    pub fn absorb(&mut self, other: MergeReport) {
        self.applied += other.applied;
        self.stale += other.stale;
    }
}

impl Snapshot {
    /// Folds `patch` into a copy of `self`.
    pub fn apply(&self, patch: &Patch) -> (Snapshot, MergeReport) {
        let mut next = self.clone();
        let mut report = MergeReport::default();
        for write in patch.writes.iter() {
            if next.merge_write(write) {
                trace!("merged {}", write.describe());
                report.applied += 1;
            } else {
                trace!("dropped stale {}", write.describe());
                report.stale += 1;
            }
        }
        (next, report)
    }

    /// Joins two snapshots.
    pub fn join(&self, other: &Snapshot) -> Snapshot {
        self.apply(&other.decompose()).0
    }

    fn merge_write(&mut self, write: &Write) -> bool {
        if let Some(stamp) = write.stamp() {
            if *stamp > self.high_water {
                self.high_water = stamp.clone();
            }
        }
        match write {
            Write::Enroll { identity } => enroll(&mut self.members, identity),
            Write::Sitting { register } => self.sitting.merge(register),
            Write::Ballot { register } => self.ballot.merge(register),
            Write::Speaker { register } => self.speaker.merge(register),
            Write::Presence { member, register } => {
                update_member(&mut self.members, member, |m| m.present.merge(register))
            }
            Write::Vote { member, register } => {
                update_member(&mut self.members, member, |m| m.vote.merge(register))
            }
            Write::Queue { member, register } => {
                update_member(&mut self.members, member, |m| m.queued.merge(register))
            }
            Write::Motion { motion } => merge_motion(&mut self.motions, motion),
            Write::Resolution { resolution } => {
                insert_lesser(&mut self.resolutions, &resolution.case_number, resolution)
            }
            Write::Minutes { record } => {
                insert_lesser(&mut self.minutes, &record.sitting.to_string(), record)
            }
        }
    }
}

// A write for a member the roster has not delivered yet still has to land,
// or replicas would diverge on delivery order. It lands in an unenrolled
// placeholder record that the real roster entry later takes over.
fn update_member<F>(members: &mut OrdMap<MemberId, MemberRecord>, id: &MemberId, f: F) -> bool
where
    F: FnOnce(&mut MemberRecord) -> bool,
{
    let (mut record, fresh) = match members.get(id) {
        Some(record) => (record.clone(), false),
        None => {
            let mut placeholder = MemberIdentity::default();
            placeholder.id = id.clone();
            let record = MemberRecord {
                enrolled: false,
                ..MemberRecord::new(placeholder)
            };
            (record, true)
        }
    };
    let changed = f(&mut record);
    if changed || fresh {
        members.insert(id.clone(), record);
    }
    changed
}

// Enrollment is a one-way flag and identities join as the greater of the
// two. A placeholder has empty strings everywhere, so any real roster entry
// for the same id beats it.
fn enroll(members: &mut OrdMap<MemberId, MemberRecord>, identity: &MemberIdentity) -> bool {
    update_member(members, &identity.id, |m| {
        let mut changed = !m.enrolled;
        m.enrolled = true;
        if *identity > m.identity {
            m.identity = identity.clone();
            changed = true;
        }
        changed
    })
}

fn motion_body(m: &Motion) -> (&String, &String, &MemberId, &chrono::DateTime<chrono::Utc>) {
    (&m.title, &m.body, &m.proposer, &m.submitted_at)
}

fn merge_motion(motions: &mut OrdMap<crate::MotionId, Motion>, incoming: &Motion) -> bool {
    let mut merged = match motions.get(&incoming.id) {
        None => {
            motions.insert(incoming.id.clone(), incoming.clone());
            return true;
        }
        Some(existing) => existing.clone(),
    };
    let mut changed = merged.status.merge(&incoming.status);
    if motion_body(incoming).cmp(&motion_body(&merged)) == Ordering::Less {
        merged.title = incoming.title.clone();
        merged.body = incoming.body.clone();
        merged.proposer = incoming.proposer.clone();
        merged.submitted_at = incoming.submitted_at;
        changed = true;
    }
    if changed {
        motions.insert(incoming.id.clone(), merged);
    }
    changed
}

fn insert_lesser<V: Clone + Ord>(map: &mut OrdMap<String, V>, key: &str, incoming: &V) -> bool {
    match map.get(key) {
        Some(existing) if existing <= incoming => false,
        _ => {
            map.insert(key.to_string(), incoming.clone());
            true
        }
    }
}
