// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

//! The per-client dispatch loop.
//!
//! A `Replica` owns one client's snapshot and serializes everything that
//! changes it: local actions go through the reducer, remote patches come in
//! through the transport subscription, and both end up as merges into the
//! same snapshot. The subscription handler only enqueues; nothing is merged
//! until the owner calls `pump`, so the snapshot is never touched from a
//! transport callback.

use crate::{
    reduce, Action, Caller, Clock, Context, MergeReport, Patch, PatchGate, Rejection, Result,
    Roster, SessionConfig, Snapshot, Subscription, Transport,
};
use chrono::{DateTime, Utc};
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info, trace, warn};

pub struct Replica<T: Transport> {
    clock: Clock,
    snapshot: Snapshot,
    transport: T,
    topic: String,
    gate: Box<dyn PatchGate + Send>,
    inbox: UnboundedReceiver<Patch>,
    subscription: Option<Subscription>,
    snapshot_path: Option<PathBuf>,
}

impl<T: Transport> Replica<T> {
    pub fn new(transport: T, config: &SessionConfig) -> Self {
        let (tx, inbox) = unbounded();
        let subscription = transport.subscribe(
            &config.topic,
            Box::new(move |patch| {
                // The receiver only goes away with the replica, which
                // unsubscribes first.
                let _ = tx.unbounded_send(patch);
            }),
        );
        debug!(
            "replica {} subscribed to {}",
            config.publisher, subscription.topic
        );
        Replica {
            clock: Clock::new(config.publisher.clone()),
            snapshot: Snapshot::new(),
            transport,
            topic: config.topic.clone(),
            gate: config.gate(),
            inbox,
            subscription: Some(subscription),
            snapshot_path: config.snapshot_path.clone(),
        }
    }

    /// Like `new`, but starting from the snapshot persisted at the
    /// configured path, if there is one.
    pub fn resume(transport: T, config: &SessionConfig) -> Result<Self> {
        let mut replica = Replica::new(transport, config);
        let path = match &config.snapshot_path {
            Some(path) => path,
            None => return Ok(replica),
        };
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no snapshot at {}, starting empty", path.display());
                return Ok(replica);
            }
            Err(e) => return Err(e.into()),
        };
        let restored = Snapshot::deserialize(&text)?;
        replica.clock.observe(restored.version());
        info!(
            "replica {} resumed at version {}",
            replica.clock.publisher(),
            restored.version()
        );
        replica.snapshot = restored;
        Ok(replica)
    }

    /// Writes the snapshot to the configured path. Returns false when no
    /// path is configured.
    pub fn persist(&self) -> Result<bool> {
        let path = match &self.snapshot_path {
            Some(path) => path,
            None => return Ok(false),
        };
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, self.snapshot.serialize()?)?;
        fs::rename(&tmp, path)?;
        trace!("persisted snapshot {} to {}", self.snapshot.version(), path.display());
        Ok(true)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn clock_time(&self) -> u64 {
        self.clock.time()
    }

    pub fn dispatch(&mut self, caller: &Caller, action: &Action) -> std::result::Result<&Snapshot, Rejection> {
        self.dispatch_at(caller, action, Utc::now())
    }

    /// Runs one local action with an explicit wall-clock time. Wall time
    /// only ends up in recorded fields; ordering comes from the clock.
    pub fn dispatch_at(
        &mut self,
        caller: &Caller,
        action: &Action,
        now: DateTime<Utc>,
    ) -> std::result::Result<&Snapshot, Rejection> {
        let ctx = Context {
            caller: caller.clone(),
            stamp: self.clock.tick(),
            now,
        };
        let next = match reduce(&self.snapshot, &ctx, action) {
            Ok(next) => next,
            Err(rejection) => {
                debug!(
                    "{} rejected {} from {}: {}",
                    self.clock.publisher(),
                    action.name(),
                    caller.member,
                    rejection
                );
                return Err(rejection);
            }
        };
        let patch = self.snapshot.diff(&next);
        self.snapshot = next;
        if patch.is_empty() {
            trace!("{} from {} changed nothing", action.name(), caller.member);
        } else {
            match action {
                Action::OpenSession | Action::CloseSession => info!(
                    "{} by {} at {}",
                    action.name(),
                    caller.member,
                    ctx.stamp
                ),
                _ => debug!(
                    "{} by {} at {}, publishing {} writes",
                    action.name(),
                    caller.member,
                    ctx.stamp,
                    patch.len()
                ),
            }
            self.transport.publish(&self.topic, &patch);
        }
        Ok(&self.snapshot)
    }

    /// Merges the provisioned roster and publishes it.
    pub fn provision(&mut self, roster: &Roster) -> MergeReport {
        let patch = roster.patch();
        let (next, report) = self.snapshot.apply(&patch);
        self.snapshot = next;
        if report.changed() {
            info!("provisioned {} members", report.applied);
            self.transport.publish(&self.topic, &patch);
        }
        report
    }

    /// Publishes the whole snapshot, for peers that joined after the
    /// writes it holds went out.
    pub fn announce(&self) {
        let patch = self.snapshot.decompose();
        if !patch.is_empty() {
            debug!("{} announcing {} writes", self.clock.publisher(), patch.len());
            self.transport.publish(&self.topic, &patch);
        }
    }

    /// Merges everything that has arrived since the last pump.
    pub fn pump(&mut self) -> MergeReport {
        self.transport.poll();
        let mut total = MergeReport::default();
        while let Ok(patch) = self.inbox.try_recv() {
            total.absorb(self.receive(patch));
        }
        if total.changed() {
            debug!(
                "{} merged {} writes ({} stale), now at {}",
                self.clock.publisher(),
                total.applied,
                total.stale,
                self.snapshot.version()
            );
        }
        total
    }

    /// Merges a patch straight off the wire. Malformed input is dropped.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> MergeReport {
        match Patch::decode(bytes) {
            Ok(patch) => self.receive(patch),
            Err(e) => {
                warn!("{} dropped malformed patch: {}", self.clock.publisher(), e);
                MergeReport::default()
            }
        }
    }

    // Writes stamped beyond the clock's reach are dropped before anything
    // else looks at them. The clock observes gate-refused writes too, so
    // that a local write always outranks anything this replica has been
    // shown.
    fn receive(&mut self, patch: Patch) -> MergeReport {
        let before = patch.len();
        let patch: Patch = patch
            .writes
            .into_iter()
            .filter(|w| w.stamp().map_or(true, |stamp| self.clock.within_reach(stamp)))
            .collect();
        if patch.len() < before {
            warn!(
                "{} dropped {} writes stamped too far ahead of {}",
                self.clock.publisher(),
                before - patch.len(),
                self.clock.time()
            );
        }
        if let Some(stamp) = patch.high_water() {
            self.clock.observe(stamp);
        }
        let (admitted, refused) = self.gate.screen(patch);
        if refused > 0 {
            warn!("{} refused {} remote writes", self.clock.publisher(), refused);
        }
        let (next, report) = self.snapshot.apply(&admitted);
        self.snapshot = next;
        report
    }
}

impl<T: Transport> Drop for Replica<T> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.transport.unsubscribe(&subscription);
        }
    }
}
