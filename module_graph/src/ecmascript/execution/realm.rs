// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [9.3 Realms](https://tc39.es/ecma262/#sec-code-realms)

use core::ops::Index;

use crate::{
    ecmascript::types::HostDefined,
    heap::{CreateHeapData, Heap, next_index},
};

use super::Agent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Realm(u32);

impl Realm {
    pub(crate) fn get_index(self) -> usize {
        self.0 as usize
    }

    /// ### \[\[HostDefined]]
    pub fn host_defined(self, agent: &Agent) -> Option<HostDefined> {
        agent[self].host_defined.clone()
    }
}

/// ### [9.3.1 Realm Records](https://tc39.es/ecma262/#sec-code-realms)
#[derive(Debug)]
pub struct RealmRecord {
    /// ### \[\[HostDefined]]
    ///
    /// Field reserved for use by hosts that need to associate additional
    /// information with a Realm Record.
    pub(crate) host_defined: Option<HostDefined>,
}

impl CreateHeapData<RealmRecord, Realm> for Heap {
    fn create(&mut self, data: RealmRecord) -> Realm {
        let index = next_index(&self.realms);
        self.realms.push(data);
        Realm(index)
    }
}

impl Index<Realm> for Agent {
    type Output = RealmRecord;

    fn index(&self, index: Realm) -> &Self::Output {
        self.heap
            .realms
            .get(index.get_index())
            .expect("Realm out of bounds")
    }
}
