// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

//! The parliamentary state machine.
//!
//! `reduce` is a pure function of the current snapshot, the action and its
//! context. It never mutates anything: it plans the writes the action
//! implies, every one stamped with the context's stamp, and returns the
//! snapshot with those writes merged. Because the stamp is newer than
//! anything the replica has seen, every planned write lands, and because
//! the same writes are what the dispatch loop publishes, peers end up
//! applying exactly what the acting replica applied.
//!
//! Preconditions that fail produce a `Rejection` and no writes. Some
//! actions are legitimately idle (replaying an identical vote, archiving an
//! archived motion); those succeed with an unchanged snapshot.

use crate::{
    Action, Ballot, CastVote, Context, Lww, MemberId, Motion, MotionId, MotionStatus, Patch,
    QueueEntry, Resolution, SessionRecord, Sitting, Snapshot, SpeakerGrant, Stamp, Verdict,
    VoteChoice, Write,
};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("only the chair may do that")]
    NotPresiding,
    #[error("{0} cannot act on behalf of another member")]
    ActingForAnother(MemberId),
    #[error("the session is already open")]
    SessionAlreadyOpen,
    #[error("the session is closed")]
    SessionClosed,
    #[error("no member {0} on the roster")]
    UnknownMember(MemberId),
    #[error("{0} is not waiting for the floor")]
    NotQueued(MemberId),
    #[error("nobody holds the floor")]
    NoSpeaker,
    #[error("ballot {0} is still open")]
    BallotAlreadyOpen(String),
    #[error("no ballot is open")]
    NoBallot,
    #[error("{0} is not marked present")]
    NotPresent(MemberId),
    #[error("{0} has already voted in this ballot")]
    AlreadyVoted(MemberId),
    #[error("no motion {0}")]
    UnknownMotion(MotionId),
    #[error("motion {0} is not pending")]
    MotionNotPending(MotionId),
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

pub fn reduce(state: &Snapshot, ctx: &Context, action: &Action) -> Result<Snapshot, Rejection> {
    let writes = plan(state, ctx, action)?;
    if writes.is_empty() {
        return Ok(state.clone());
    }
    Ok(state.apply(&Patch::new(writes)).0)
}

fn plan(state: &Snapshot, ctx: &Context, action: &Action) -> Result<Vec<Write>, Rejection> {
    match action {
        Action::OpenSession => open_session(state, ctx),
        Action::CloseSession => close_session(state, ctx),
        Action::ToggleAttendance { member } => toggle_attendance(state, ctx, member),
        Action::RequestFloor { member } => request_floor(state, ctx, member),
        Action::GrantFloor { member } => grant_floor(state, ctx, member.as_ref()),
        Action::RevokeFloor => revoke_floor(state, ctx),
        Action::OpenVote { subject, motion } => open_vote(state, ctx, subject, motion.as_ref()),
        Action::CastVote { member, choice } => cast_vote(state, ctx, member, *choice),
        Action::CloseVoteAndArchive => close_vote(state, ctx),
        Action::SubmitMotion {
            title,
            body,
            proposer,
        } => submit_motion(state, ctx, title, body, proposer),
        Action::ArchiveMotion { motion } => {
            set_motion_status(state, ctx, motion, MotionStatus::Archived)
        }
        Action::RestoreMotion { motion } => {
            set_motion_status(state, ctx, motion, MotionStatus::Pending)
        }
    }
}

// Shared precondition checks.

fn require_chair(ctx: &Context) -> Result<(), Rejection> {
    if ctx.caller.presiding {
        Ok(())
    } else {
        Err(Rejection::NotPresiding)
    }
}

fn require_self_or_chair(ctx: &Context, member: &MemberId) -> Result<(), Rejection> {
    if ctx.caller.presiding || ctx.caller.member == *member {
        Ok(())
    } else {
        Err(Rejection::ActingForAnother(ctx.caller.member.clone()))
    }
}

fn require_sitting(state: &Snapshot) -> Result<Stamp, Rejection> {
    state.sitting_stamp().cloned().ok_or(Rejection::SessionClosed)
}

fn require_member(state: &Snapshot, member: &MemberId) -> Result<(), Rejection> {
    if state.member(member).is_some() {
        Ok(())
    } else {
        Err(Rejection::UnknownMember(member.clone()))
    }
}

fn require_text<'a>(text: &'a str, what: &'static str) -> Result<&'a str, Rejection> {
    let text = text.trim();
    if text.is_empty() {
        Err(Rejection::Empty(what))
    } else {
        Ok(text)
    }
}

// Write builders, all stamped with the action's stamp.

fn clear_votes(state: &Snapshot, ctx: &Context) -> impl Iterator<Item = Write> {
    let stamp = ctx.stamp.clone();
    let ids: Vec<MemberId> = state.members().map(|m| m.id().clone()).collect();
    ids.into_iter().map(move |member| Write::Vote {
        member,
        register: Lww::new(stamp.clone(), None),
    })
}

fn clear_queue(state: &Snapshot, ctx: &Context) -> impl Iterator<Item = Write> {
    let stamp = ctx.stamp.clone();
    let ids: Vec<MemberId> = state.members().map(|m| m.id().clone()).collect();
    ids.into_iter().map(move |member| Write::Queue {
        member,
        register: Lww::new(stamp.clone(), None),
    })
}

fn motion_status(motion: &Motion, ctx: &Context, status: MotionStatus) -> Write {
    let mut motion = motion.clone();
    motion.status = Lww::new(ctx.stamp.clone(), status);
    Write::Motion { motion }
}

// Sitting.

fn open_session(state: &Snapshot, ctx: &Context) -> Result<Vec<Write>, Rejection> {
    require_chair(ctx)?;
    if state.is_open() {
        return Err(Rejection::SessionAlreadyOpen);
    }
    Ok(vec![Write::Sitting {
        register: Lww::new(ctx.stamp.clone(), Sitting::Open { started_at: ctx.now }),
    }])
}

// Closing republishes every clear as a fresh write, so a vote or queue
// request stamped before the close can never win against it.
// Writes pending over every stored debate status bar `except`. Reads already
// treat those motions as pending (see `Snapshot::motion_status`); this makes
// it stick once the ballot that could revive them is gone.
fn table_debates<'a>(
    state: &'a Snapshot,
    ctx: &'a Context,
    except: Option<&'a MotionId>,
) -> impl Iterator<Item = Write> + 'a {
    state
        .motions()
        .filter(move |m| m.status() == MotionStatus::Debate && Some(&m.id) != except)
        .map(move |m| motion_status(m, ctx, MotionStatus::Pending))
}

fn close_session(state: &Snapshot, ctx: &Context) -> Result<Vec<Write>, Rejection> {
    require_chair(ctx)?;
    let sitting = require_sitting(state)?;

    let mut writes = vec![
        Write::Sitting {
            register: Lww::new(ctx.stamp.clone(), Sitting::Closed),
        },
        Write::Ballot {
            register: Lww::new(ctx.stamp.clone(), None),
        },
        Write::Speaker {
            register: Lww::new(ctx.stamp.clone(), None),
        },
    ];
    writes.extend(clear_votes(state, ctx));
    writes.extend(clear_queue(state, ctx));

    // A motion whose ballot dies with the sitting goes back to the table.
    writes.extend(table_debates(state, ctx, None));

    let (present, absent): (Vec<_>, Vec<_>) = state.members().partition(|m| m.present.value);
    let record = SessionRecord {
        sitting: sitting.clone(),
        closed: ctx.stamp.clone(),
        opened_at: state.sitting().started_at(),
        closed_at: ctx.now,
        present: present.into_iter().map(|m| m.id().clone()).collect(),
        absent: absent.into_iter().map(|m| m.id().clone()).collect(),
        resolutions: state
            .resolutions()
            .into_iter()
            .filter(|r| r.sitting == sitting)
            .map(|r| r.case_number.clone())
            .collect(),
    };
    writes.push(Write::Minutes { record });
    Ok(writes)
}

// Attendance.

fn toggle_attendance(
    state: &Snapshot,
    ctx: &Context,
    member: &MemberId,
) -> Result<Vec<Write>, Rejection> {
    require_chair(ctx)?;
    require_member(state, member)?;
    Ok(vec![Write::Presence {
        member: member.clone(),
        register: Lww::new(ctx.stamp.clone(), !state.is_present(member)),
    }])
}

// Floor.

fn request_floor(
    state: &Snapshot,
    ctx: &Context,
    member: &MemberId,
) -> Result<Vec<Write>, Rejection> {
    let sitting = require_sitting(state)?;
    require_member(state, member)?;
    require_self_or_chair(ctx, member)?;
    let waiting = state.speaker_queue().contains(member);
    let entry = if waiting {
        None
    } else {
        Some(QueueEntry { sitting })
    };
    Ok(vec![Write::Queue {
        member: member.clone(),
        register: Lww::new(ctx.stamp.clone(), entry),
    }])
}

fn grant_floor(
    state: &Snapshot,
    ctx: &Context,
    member: Option<&MemberId>,
) -> Result<Vec<Write>, Rejection> {
    require_chair(ctx)?;
    let member = match member {
        Some(member) => member,
        None if state.speaker().is_none() => return Ok(Vec::new()),
        None => {
            return Ok(vec![Write::Speaker {
                register: Lww::new(ctx.stamp.clone(), None),
            }])
        }
    };
    let sitting = require_sitting(state)?;
    if !state.speaker_queue().contains(member) {
        return Err(Rejection::NotQueued(member.clone()));
    }
    // One register holds the grant, so the previous holder is displaced by
    // the same write that installs the new one.
    Ok(vec![
        Write::Queue {
            member: member.clone(),
            register: Lww::new(ctx.stamp.clone(), None),
        },
        Write::Speaker {
            register: Lww::new(
                ctx.stamp.clone(),
                Some(SpeakerGrant {
                    member: member.clone(),
                    sitting,
                }),
            ),
        },
    ])
}

fn revoke_floor(state: &Snapshot, ctx: &Context) -> Result<Vec<Write>, Rejection> {
    require_chair(ctx)?;
    if state.speaker().is_none() {
        return Err(Rejection::NoSpeaker);
    }
    Ok(vec![Write::Speaker {
        register: Lww::new(ctx.stamp.clone(), None),
    }])
}

// Voting.

pub fn case_number(stamp: &Stamp) -> String {
    format!("RES-{}-{}", stamp.time, stamp.publisher)
}

fn open_vote(
    state: &Snapshot,
    ctx: &Context,
    subject: &str,
    motion: Option<&MotionId>,
) -> Result<Vec<Write>, Rejection> {
    require_chair(ctx)?;
    let sitting = require_sitting(state)?;
    if let Some(open) = state.ballot() {
        return Err(Rejection::BallotAlreadyOpen(open.case_number.clone()));
    }
    let subject = require_text(subject, "subject")?;

    let mut writes = Vec::new();
    if let Some(id) = motion {
        let linked = state
            .motion(id)
            .ok_or_else(|| Rejection::UnknownMotion(id.clone()))?;
        if state.motion_status(id) != Some(MotionStatus::Pending) {
            return Err(Rejection::MotionNotPending(id.clone()));
        }
        writes.push(motion_status(linked, ctx, MotionStatus::Debate));
    }
    let ballot = Ballot {
        subject: subject.to_string(),
        case_number: case_number(&ctx.stamp),
        opened_at: ctx.now,
        sitting,
        motion: motion.cloned(),
    };
    writes.push(Write::Ballot {
        register: Lww::new(ctx.stamp.clone(), Some(ballot)),
    });
    Ok(writes)
}

fn cast_vote(
    state: &Snapshot,
    ctx: &Context,
    member: &MemberId,
    choice: VoteChoice,
) -> Result<Vec<Write>, Rejection> {
    require_sitting(state)?;
    let ballot = state.ballot().ok_or(Rejection::NoBallot)?;
    require_member(state, member)?;
    if ctx.caller.member != *member {
        return Err(Rejection::ActingForAnother(ctx.caller.member.clone()));
    }
    if !state.is_present(member) {
        return Err(Rejection::NotPresent(member.clone()));
    }
    match state.current_vote(member) {
        Some(existing) if existing == choice => Ok(Vec::new()),
        Some(_) => Err(Rejection::AlreadyVoted(member.clone())),
        None => Ok(vec![Write::Vote {
            member: member.clone(),
            register: Lww::new(
                ctx.stamp.clone(),
                Some(CastVote {
                    case_number: ballot.case_number.clone(),
                    choice,
                }),
            ),
        }]),
    }
}

fn close_vote(state: &Snapshot, ctx: &Context) -> Result<Vec<Write>, Rejection> {
    require_chair(ctx)?;
    let ballot = state.ballot().ok_or(Rejection::NoBallot)?;
    let tally = state.tally();
    let resolution = Resolution::archive(
        ballot,
        tally,
        state.nominal_votes(),
        ctx.stamp.clone(),
        ctx.now,
    );

    let mut writes = vec![
        Write::Resolution { resolution },
        Write::Ballot {
            register: Lww::new(ctx.stamp.clone(), None),
        },
    ];
    writes.extend(clear_votes(state, ctx));
    if let Some(motion) = ballot.motion.as_ref().and_then(|id| state.motion(id)) {
        let status = match tally.verdict() {
            Verdict::Approved => MotionStatus::Approved,
            Verdict::Rejected => MotionStatus::Rejected,
        };
        writes.push(motion_status(motion, ctx, status));
    }
    writes.extend(table_debates(state, ctx, ballot.motion.as_ref()));
    Ok(writes)
}

// Motions.

pub fn motion_id(stamp: &Stamp) -> MotionId {
    MotionId::new(format!("MOC-{}-{}", stamp.time, stamp.publisher))
}

fn submit_motion(
    state: &Snapshot,
    ctx: &Context,
    title: &str,
    body: &str,
    proposer: &MemberId,
) -> Result<Vec<Write>, Rejection> {
    let title = require_text(title, "title")?;
    require_member(state, proposer)?;
    require_self_or_chair(ctx, proposer)?;
    let motion = Motion {
        id: motion_id(&ctx.stamp),
        title: title.to_string(),
        body: body.to_string(),
        proposer: proposer.clone(),
        submitted_at: ctx.now,
        status: Lww::new(ctx.stamp.clone(), MotionStatus::Pending),
    };
    Ok(vec![Write::Motion { motion }])
}

fn set_motion_status(
    state: &Snapshot,
    ctx: &Context,
    id: &MotionId,
    status: MotionStatus,
) -> Result<Vec<Write>, Rejection> {
    let motion = state
        .motion(id)
        .ok_or_else(|| Rejection::UnknownMotion(id.clone()))?;
    if motion.status() == status && state.motion_status(id) == Some(status) {
        return Ok(Vec::new());
    }
    Ok(vec![motion_status(motion, ctx, status)])
}
