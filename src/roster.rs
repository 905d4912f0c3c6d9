// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{Caller, MemberIdentity, Patch, Result, Write};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// The provisioned list of delegates, as distributed before a session.
///
/// This is also the login boundary: a client presents a credential
/// fingerprint and gets back the `Caller` it may act as, with the
/// presiding claim derived from the member's role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub members: Vec<MemberIdentity>,
}

impl Roster {
    pub fn new(members: Vec<MemberIdentity>) -> Self {
        Roster { members }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Roster::from_json(&fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn authenticate(&self, fingerprint: &str) -> Option<Caller> {
        if fingerprint.is_empty() {
            return None;
        }
        let found = self.members.iter().find(|m| m.fingerprint == fingerprint)?;
        debug!(
            "authenticated {} as {:?}, presiding: {}",
            found.id,
            found.role,
            found.role.presides()
        );
        Some(Caller {
            member: found.id.clone(),
            presiding: found.role.presides(),
        })
    }

    /// The roster as enrollment writes, ready to merge or publish.
    pub fn patch(&self) -> Patch {
        self.members
            .iter()
            .cloned()
            .map(|identity| Write::Enroll { identity })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemberId, Office, Role, Snapshot};

    fn roster() -> Roster {
        Roster::new(vec![
            MemberIdentity::new("49993070", "Presidency", Role::Titular(Office::President))
                .with_fingerprint("f-pres"),
            MemberIdentity::new("m1", "Member One", Role::Substitute(Office::President))
                .with_fingerprint("f-m1"),
            MemberIdentity::new("m2", "Member Two", Role::Titular(Office::Treasurer))
                .with_fingerprint("f-m2"),
            MemberIdentity::new("m3", "Member Three", Role::Delegate),
        ])
    }

    #[test]
    fn authenticate_derives_presiding_from_role() {
        let r = roster();
        assert_eq!(r.authenticate("f-pres"), Some(Caller::chair("49993070")));
        assert_eq!(r.authenticate("f-m1"), Some(Caller::chair("m1")));
        assert_eq!(r.authenticate("f-m2"), Some(Caller::member("m2")));
        assert_eq!(r.authenticate("nope"), None);
        // A member without a credential cannot be logged in as.
        assert_eq!(r.authenticate(""), None);
    }

    #[test]
    fn patch_enrolls_everyone() {
        let r = roster();
        let snap = Snapshot::new().apply(&r.patch()).0;
        assert_eq!(snap.total_members(), 4);
        assert_eq!(snap.member(&MemberId::new("m3")).unwrap().identity.display_name, "Member Three");
        assert_eq!(snap, Snapshot::with_roster(r.members.clone()));
    }

    #[test]
    fn loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(&path, serde_json::to_string(&roster()).unwrap()).unwrap();
        assert_eq!(Roster::load(&path).unwrap(), roster());
        assert!(Roster::from_json("{\"members\": 3}").is_err());
    }
}
