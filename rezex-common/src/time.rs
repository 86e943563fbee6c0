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

use std::sync::OnceLock;
use std::time::Instant;

use chrono::Utc;

static PROCESS_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since this process first called into `rezex-common`.
/// Used for `last_used_at`/`eviction_timestamp`/protection-window
/// bookkeeping, where a `u64` that fits in an `AtomicU64` is more useful
/// than `Instant` (which isn't `Copy`-into-an-atomic).
pub fn monotonic_millis() -> u64 {
    let epoch = PROCESS_EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u64
}

/// `YYYY-MM-DDTHH:MM:SSZ`, as spec.md §6 requires for the metrics
/// snapshot's `generated_at` field.
pub fn format_rfc3339_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_millis_is_nondecreasing() {
        let a = monotonic_millis();
        let b = monotonic_millis();
        assert!(b >= a);
    }

    #[test]
    fn rfc3339_has_expected_shape() {
        let s = format_rfc3339_now();
        assert_eq!(s.len(), "YYYY-MM-DDTHH:MM:SSZ".len());
        assert!(s.ends_with('Z'));
        assert_eq!(s.as_bytes()[4], b'-');
        assert_eq!(s.as_bytes()[10], b'T');
    }
}
