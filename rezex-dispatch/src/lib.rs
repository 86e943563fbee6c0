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

//! The Dispatch Layer (DL) and the external handle table it sits on
//! top of (spec.md §4.6). `rezex` (the facade crate) is the only
//! intended caller of this crate; everything here is re-exported
//! through it.

mod dispatch;
mod handle_table;

pub use dispatch::{Dispatcher, MatchResult, ReplaceAllResult, ReplaceFirstResult};
pub use handle_table::{HandleId, HandleTable};
pub use rezex_util::ByteView;
