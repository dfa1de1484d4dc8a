// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## [20.5 Error Objects](https://tc39.es/ecma262/#sec-error-objects)
//!
//! The engine never inspects thrown values beyond their kind and message, so
//! an error object is just those two fields. Each thrown error has its own
//! identity: re-surfacing a stored error hands out the same handle again.

use core::ops::Index;

use crate::{
    ecmascript::execution::{Agent, ExceptionType},
    heap::{CreateHeapData, Heap, next_index},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Error(u32);

impl Error {
    pub(crate) fn get_index(self) -> usize {
        self.0 as usize
    }

    pub fn kind(self, agent: &Agent) -> ExceptionType {
        agent[self].kind
    }

    pub fn message(self, agent: &Agent) -> &str {
        &agent[self].message
    }
}

#[derive(Debug)]
pub struct ErrorHeapData {
    pub(crate) kind: ExceptionType,
    pub(crate) message: String,
}

impl CreateHeapData<ErrorHeapData, Error> for Heap {
    fn create(&mut self, data: ErrorHeapData) -> Error {
        let index = next_index(&self.errors);
        self.errors.push(data);
        Error(index)
    }
}

impl Index<Error> for Agent {
    type Output = ErrorHeapData;

    fn index(&self, index: Error) -> &Self::Output {
        self.heap
            .errors
            .get(index.get_index())
            .expect("Error out of bounds")
    }
}
