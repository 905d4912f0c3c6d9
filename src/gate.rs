// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

//! Admission of remote writes, ahead of the merge.
//!
//! Authorization in the reducer is advisory: it guards what this client
//! does, not what arrives from the network. A gate is the place a replica
//! can refuse remote writes it does not believe were authorized, without
//! the reducer knowing anything about it.

use crate::{Patch, PublisherId, Write};
use std::collections::BTreeSet;
use tracing::warn;

pub trait PatchGate {
    fn admit(&self, write: &Write) -> bool;

    /// Splits off the admissible part of `patch`; returns it along with the
    /// number of writes refused.
    fn screen(&self, patch: Patch) -> (Patch, usize) {
        let total = patch.len();
        let admitted: Patch = patch.writes.into_iter().filter(|w| self.admit(w)).collect();
        let refused = total - admitted.len();
        (admitted, refused)
    }
}

/// Admits everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenGate;

impl PatchGate for OpenGate {
    fn admit(&self, _write: &Write) -> bool {
        true
    }
}

/// Admits writes to chair-only fields only from known chair publishers.
#[derive(Clone, Debug, Default)]
pub struct PresidingGate {
    chairs: BTreeSet<PublisherId>,
}

impl PresidingGate {
    pub fn new<I: IntoIterator<Item = PublisherId>>(chairs: I) -> Self {
        PresidingGate {
            chairs: chairs.into_iter().collect(),
        }
    }
}

impl PatchGate for PresidingGate {
    fn admit(&self, write: &Write) -> bool {
        if !write.is_presiding_only() {
            return true;
        }
        match write.stamp() {
            Some(stamp) if self.chairs.contains(&stamp.publisher) => true,
            _ => {
                warn!("refusing {} from a publisher not known to chair", write.describe());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CastVote, Lww, MemberId, Sitting, Stamp, VoteChoice};

    fn sitting_by(publisher: &str) -> Write {
        Write::Sitting {
            register: Lww::new(Stamp::new(9, PublisherId::new(publisher)), Sitting::Closed),
        }
    }

    #[test]
    fn presiding_gate_filters_only_chair_fields() {
        let gate = PresidingGate::new(vec![PublisherId::new("chair-laptop")]);
        let vote = Write::Vote {
            member: MemberId::new("m1"),
            register: Lww::new(
                Stamp::new(3, PublisherId::new("m1-phone")),
                Some(CastVote {
                    case_number: "RES-1-chair-laptop".into(),
                    choice: VoteChoice::Yes,
                }),
            ),
        };
        let patch = Patch::new(vec![sitting_by("m1-phone"), sitting_by("chair-laptop"), vote]);
        let (admitted, refused) = gate.screen(patch);
        assert_eq!(refused, 1);
        assert_eq!(admitted.len(), 2);
        assert!(OpenGate.admit(&sitting_by("anyone")));
    }
}
