// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{Lww, Stamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a registered delegate.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        MemberId(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Council offices a registered delegate can hold. Each office except
/// `Delegate` comes in a titular and a substitute flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Office {
    President,
    VicePresident,
    FirstReplacement,
    SecondReplacement,
    SecretaryGeneral,
    Treasurer,
    MemberAtLarge,
    FacultyAdvisor,
    HeadOfSecretariats,
    RecordingSecretary,
    CultureSecretary,
    StudentRightsSecretary,
    SportsSecretary,
    FinanceSecretary,
    EventsSecretary,
    PressSecretary,
    ForeignRelationsSecretary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Titular(Office),
    Substitute(Office),
    Delegate,
}

impl Role {
    pub fn office(&self) -> Option<Office> {
        match self {
            Role::Titular(o) | Role::Substitute(o) => Some(*o),
            Role::Delegate => None,
        }
    }

    /// Whether holders of this role may chair a sitting. The substitute
    /// president chairs in the titular's absence, so both qualify.
    pub fn presides(&self) -> bool {
        self.office() == Some(Office::President)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Delegate
    }
}

/// Roster data for one delegate. Provisioned before the session and never
/// changed by the reducer.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub id: MemberId,
    pub display_name: String,
    /// Digest of the member's login credential, used by the login boundary
    /// to resolve who is calling. Never compared against anything else.
    pub fingerprint: String,
    pub role: Role,
    pub seat: Option<u32>,
}

impl MemberIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        MemberIdentity {
            id: MemberId::new(id),
            display_name: display_name.into(),
            fingerprint: String::new(),
            role,
            seat: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn with_seat(mut self, seat: u32) -> Self {
        self.seat = Some(seat);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoteChoice::Yes => "YES",
            VoteChoice::No => "NO",
            VoteChoice::Abstain => "ABSTAIN",
        };
        f.write_str(s)
    }
}

/// A vote as stored in a member's register: the choice, bound to the case
/// number of the ballot it was cast in. A vote whose case number is not the
/// open ballot's is dead and never read back as the member's current vote.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CastVote {
    pub case_number: String,
    pub choice: VoteChoice,
}

/// Membership of the speaker queue, bound to the sitting it was requested in.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueEntry {
    pub sitting: Stamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FloorState {
    None,
    Waiting,
    Granted,
}

impl Default for FloorState {
    fn default() -> Self {
        FloorState::None
    }
}

/// Replicated per-member state. Every mutable leaf is its own register so
/// concurrent writers touching different leaves never clobber each other.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRecord {
    pub identity: MemberIdentity,
    /// Set once the roster has delivered this member. Records that only
    /// hold writes addressed to an unknown id are left out of every count.
    pub enrolled: bool,
    pub present: Lww<bool>,
    pub vote: Lww<Option<CastVote>>,
    pub queued: Lww<Option<QueueEntry>>,
}

impl MemberRecord {
    pub fn new(identity: MemberIdentity) -> Self {
        MemberRecord {
            identity,
            enrolled: true,
            present: Lww::default(),
            vote: Lww::default(),
            queued: Lww::default(),
        }
    }

    pub fn id(&self) -> &MemberId {
        &self.identity.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_presidency_presides() {
        assert!(Role::Titular(Office::President).presides());
        assert!(Role::Substitute(Office::President).presides());
        assert!(!Role::Titular(Office::VicePresident).presides());
        assert!(!Role::Titular(Office::SecretaryGeneral).presides());
        assert!(!Role::Delegate.presides());
    }

    #[test]
    fn vote_choice_wire_names() {
        let json = serde_json::to_string(&VoteChoice::Abstain).unwrap();
        assert_eq!(json, "\"ABSTAIN\"");
        let back: VoteChoice = serde_json::from_str("\"YES\"").unwrap();
        assert_eq!(back, VoteChoice::Yes);
    }
}
