// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod error;
pub mod module_namespace;
pub mod promise;

pub use error::Error;
pub use module_namespace::ModuleNamespace;
pub use promise::{Promise, PromiseCapability, PromiseState};
