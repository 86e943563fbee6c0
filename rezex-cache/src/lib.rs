//  Copyright 2025 rezex authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! The pattern-lifecycle and cache subsystem: the Pattern Cache (PC),
//! the Deferred-Release Queue (DRQ), the Reclamation Worker (RW), and
//! the Pattern Record/Handle types they all operate on.

mod cache;
mod config;
mod deferred;
mod record;
mod reclaim;

pub use cache::PatternCache;
pub use config::CacheConfig;
pub use deferred::DeferredQueue;
pub use record::{PatternHandle, PatternState};
pub use reclaim::ReclamationWorker;
