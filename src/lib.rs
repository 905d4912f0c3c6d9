// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

/*!
 * This crate is the replicated state layer of a small parliamentary session
 * manager: a roster of delegates, attendance and quorum, a floor queue with a
 * single speaker, roll-call ballots archived as numbered resolutions, and a
 * motions docket. Every client holds its own copy of the session and changes
 * it by dispatching actions; the changes travel to everybody else over a
 * pluggable publish/subscribe transport.
 *
 * There is no server and no consensus round. Instead:
 *
 *   - Every replicated leaf is a last-writer-wins register, ordered by a
 *     Lamport stamp `(time, publisher)`. Merging two registers is the `max`
 *     lattice join, so merge is commutative, associative and idempotent,
 *     and any two clients that have seen the same writes hold the same
 *     session regardless of delivery order or duplication.
 *
 *   - Writes are field-scoped: a vote touches one member's vote register,
 *     not the session. Concurrent writers touching different fields never
 *     clobber each other, and backends that can only store a whole blob
 *     translate at their boundary.
 *
 *   - Domain invariants that a register-per-field layout could break under
 *     concurrency (one speaker, no votes outside a live ballot, nothing left
 *     over from a closed sitting) are kept by the shape of the state rather
 *     than by coordination: the speaker is one register, votes are bound to
 *     their ballot's case number, ballots and queue slots are bound to the
 *     sitting they were made in, and reads only surface live values.
 *
 * The price is the usual one for this design: authorization is advisory.
 * The reducer refuses actions the caller may not take, but a remote write is
 * only as trustworthy as the `PatchGate` screening it.
 *
 * ## Layout
 *
 *   - `stamp`, `member`, `session`: the data model.
 *   - `patch`, `snapshot`, `merge`: field-scoped writes and how they fold
 *     into a snapshot.
 *   - `action`, `reducer`: the state machine.
 *   - `transport`, `blob`: the pub/sub medium, in-process or over a blob
 *     store.
 *   - `gate`, `roster`, `config`, `dispatch`: the per-client loop and what
 *     it is configured with.
 *
 * ## Name
 *
 * A hemicycle is the semicircular seating of a deliberative assembly.
 */

mod action;
mod blob;
mod config;
mod dispatch;
mod error;
mod gate;
mod member;
mod merge;
mod patch;
mod reducer;
mod roster;
mod session;
mod snapshot;
mod stamp;
mod transport;


pub use action::{Action, Caller, Context};
pub use blob::{BlobStore, BlobTransport, FileBlobStore, MemoryBlobStore};
pub use config::SessionConfig;
pub use dispatch::Replica;
pub use error::{Error, Result};
pub use gate::{OpenGate, PatchGate, PresidingGate};
pub use member::{
    CastVote, FloorState, MemberId, MemberIdentity, MemberRecord, Office, QueueEntry, Role,
    VoteChoice,
};
pub use merge::MergeReport;
pub use patch::{Patch, Write};
pub use reducer::{case_number, motion_id, reduce, Rejection};
pub use roster::Roster;
pub use session::{
    Ballot, Motion, MotionId, MotionStatus, NominalVote, Resolution, SessionRecord, Sitting,
    SpeakerGrant, Tally, Verdict,
};
pub use snapshot::Snapshot;
pub use stamp::{Clock, Lww, LwwDef, PublisherId, Stamp};
pub use transport::{Handler, LocalBus, Subscription, Transport};
