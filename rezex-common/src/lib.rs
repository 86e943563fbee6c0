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

//! Shared primitives used across the `rezex` workspace: the error
//! taxonomy, pattern compilation options and their cache key, monotonic
//! time helpers, and the raw metrics counters every crate boundary
//! updates.

pub mod error;
pub mod metrics;
pub mod options;
pub mod time;

pub use error::{EngineError, Result, RezexError};
pub use options::{Encoding, PatternOptions};
