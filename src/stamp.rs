// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

//! Logical timestamps and the last-writer-wins register every replicated
//! leaf is stored in.

use pergola::{LatticeDef, MaxDef, MaxUnitDefault};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Identifies one client publishing writes into a session. Used as the
/// tie-breaker between writes carrying the same logical time, so it must
/// be stable for the lifetime of a client.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublisherId(pub String);

impl PublisherId {
    pub fn new(id: impl Into<String>) -> Self {
        PublisherId(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A logical timestamp. Ordered by `time` first and `publisher` second,
/// which gives a total order on every write any client ever makes.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub time: u64,
    pub publisher: PublisherId,
}

impl Stamp {
    pub fn new(time: u64, publisher: PublisherId) -> Self {
        Stamp { time, publisher }
    }

    /// The stamp of a value nobody has written yet.
    pub fn zero() -> Self {
        Stamp::default()
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.time, self.publisher)
    }
}

/// Lamport clock owned by one replica.
#[derive(Clone, Debug)]
pub struct Clock {
    publisher: PublisherId,
    time: u64,
}

impl Clock {
    /// Largest jump ahead of the local time a remote stamp may make.
    pub const MAX_LEAP: u64 = 1 << 32;

    pub fn new(publisher: PublisherId) -> Self {
        Clock { publisher, time: 0 }
    }

    pub fn publisher(&self) -> &PublisherId {
        &self.publisher
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    /// Returns a stamp strictly greater than every stamp this clock has
    /// issued or observed. Saturates at `u64::MAX`; replicas screen out
    /// remote stamps anywhere near it, see `Clock::within_reach`.
    pub fn tick(&mut self) -> Stamp {
        self.time = self.time.saturating_add(1);
        trace!("publisher {} ticked clock to {}", self.publisher, self.time);
        Stamp::new(self.time, self.publisher.clone())
    }

    /// Whether a remote stamp is close enough to this clock to be
    /// believed. A stamp further ahead than `MAX_LEAP` would push the clock
    /// towards exhaustion and every later local write would lose to it.
    pub fn within_reach(&self, stamp: &Stamp) -> bool {
        stamp.time <= self.time.saturating_add(Clock::MAX_LEAP)
    }

    pub fn observe(&mut self, stamp: &Stamp) {
        if stamp.time > self.time {
            self.time = stamp.time;
        }
    }
}

/// A last-writer-wins register: a value plus the stamp of the write that
/// produced it.
///
/// Field order matters: the derived `Ord` compares the stamp first, so the
/// `max` lattice over `Lww<V>` is exactly "newest write wins, ties broken by
/// publisher". The value only takes part in the comparison when two writes
/// carry an identical stamp, which a well-behaved publisher never produces,
/// but keeping it in the order makes the join total and deterministic anyway.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lww<V> {
    pub stamp: Stamp,
    pub value: V,
}

/// The lattice the registers live in.
pub type LwwDef<V> = MaxDef<Lww<V>>;

// The unwritten register, stamped zero, is the bottom of the max lattice.
impl<V: Default> MaxUnitDefault for Lww<V> {}

impl<V> Lww<V>
where
    V: Clone + fmt::Debug + Default + Ord + std::hash::Hash + Serialize + DeserializeOwned,
{
    pub fn new(stamp: Stamp, value: V) -> Self {
        Lww { stamp, value }
    }

    /// Least upper bound of two registers.
    pub fn join(&self, other: &Self) -> Self {
        <LwwDef<V> as LatticeDef>::join(self, other)
    }

    /// Joins `incoming` into `self`, returning true iff `incoming` was
    /// strictly newer and therefore replaced the stored value.
    pub fn merge(&mut self, incoming: &Self) -> bool {
        let joined = self.join(incoming);
        if joined == *self {
            return false;
        }
        *self = joined;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pergola::LatticeElt;

    fn stamp(time: u64, publisher: &str) -> Stamp {
        Stamp::new(time, PublisherId::new(publisher))
    }

    #[test]
    fn newer_stamp_wins() {
        let mut reg = Lww::new(stamp(100, "a"), 1u8);
        assert!(!reg.merge(&Lww::new(stamp(99, "b"), 2u8)));
        assert_eq!(reg.value, 1);
        assert!(reg.merge(&Lww::new(stamp(101, "b"), 3u8)));
        assert_eq!(reg.value, 3);
    }

    #[test]
    fn equal_time_breaks_on_publisher() {
        let a = Lww::new(stamp(5, "alpha"), 10u8);
        let b = Lww::new(stamp(5, "beta"), 0u8);
        assert_eq!(a.join(&b), b);
        assert_eq!(b.join(&a), b);
    }

    #[test]
    fn register_is_a_lattice() {
        let a = LatticeElt::<LwwDef<u8>>::new_from(Lww::new(stamp(3, "a"), 1));
        let b = LatticeElt::<LwwDef<u8>>::new_from(Lww::new(stamp(4, "b"), 0));
        assert_eq!(&a + &b, &b + &a);
        assert_eq!(&a + &a, a);
        assert!(a <= &a + &b);
    }

    #[test]
    fn clock_moves_past_observed_stamps() {
        let mut clock = Clock::new(PublisherId::new("me"));
        assert_eq!(clock.tick(), stamp(1, "me"));
        clock.observe(&stamp(41, "other"));
        assert_eq!(clock.tick(), stamp(42, "me"));
        clock.observe(&stamp(3, "other"));
        assert_eq!(clock.tick(), stamp(43, "me"));
    }

    #[test]
    fn clock_saturates_and_refuses_wild_stamps() {
        let mut clock = Clock::new(PublisherId::new("me"));
        assert!(clock.within_reach(&stamp(Clock::MAX_LEAP, "other")));
        assert!(!clock.within_reach(&stamp(u64::MAX, "other")));
        clock.observe(&stamp(u64::MAX, "other"));
        assert_eq!(clock.tick(), stamp(u64::MAX, "me"));
        assert!(clock.within_reach(&stamp(u64::MAX, "other")));
    }
}
