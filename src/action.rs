// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{MemberId, MotionId, Stamp, VoteChoice};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is acting, as vouched for by the login boundary. The presiding claim
/// is trusted as given.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub member: MemberId,
    pub presiding: bool,
}

impl Caller {
    pub fn member(id: impl Into<String>) -> Self {
        Caller {
            member: MemberId::new(id),
            presiding: false,
        }
    }

    pub fn chair(id: impl Into<String>) -> Self {
        Caller {
            member: MemberId::new(id),
            presiding: true,
        }
    }
}

/// Everything a client can ask of the session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    OpenSession,
    CloseSession,
    ToggleAttendance { member: MemberId },
    RequestFloor { member: MemberId },
    /// `None` clears the floor.
    GrantFloor { member: Option<MemberId> },
    RevokeFloor,
    OpenVote { subject: String, motion: Option<MotionId> },
    CastVote { member: MemberId, choice: VoteChoice },
    CloseVoteAndArchive,
    SubmitMotion { title: String, body: String, proposer: MemberId },
    ArchiveMotion { motion: MotionId },
    RestoreMotion { motion: MotionId },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::OpenSession => "open-session",
            Action::CloseSession => "close-session",
            Action::ToggleAttendance { .. } => "toggle-attendance",
            Action::RequestFloor { .. } => "request-floor",
            Action::GrantFloor { .. } => "grant-floor",
            Action::RevokeFloor => "revoke-floor",
            Action::OpenVote { .. } => "open-vote",
            Action::CastVote { .. } => "cast-vote",
            Action::CloseVoteAndArchive => "close-vote",
            Action::SubmitMotion { .. } => "submit-motion",
            Action::ArchiveMotion { .. } => "archive-motion",
            Action::RestoreMotion { .. } => "restore-motion",
        }
    }
}

/// Everything the reducer needs besides the state and the action. The
/// stamp must come from the replica's clock so that the action's writes
/// dominate everything the replica has seen.
#[derive(Clone, Debug)]
pub struct Context {
    pub caller: Caller,
    pub stamp: Stamp,
    pub now: DateTime<Utc>,
}
