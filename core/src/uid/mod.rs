// Copyright 2025 The TreeDb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use rand::Rng;

use crate::interface::UidSource;
use crate::models::RowTimestamp;

// ASCII-ordered, so lexicographic id order matches numeric time order.
const ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Mints 20-character ids: 8 characters of base-64 timestamp followed
/// by 12 random characters. Eight characters cover timestamps up to
/// 64^8 milliseconds, comfortably past any wall-clock date.
#[derive(Debug, Default)]
pub struct TimeOrderedUids;

impl TimeOrderedUids {
    pub fn new() -> Self {
        TimeOrderedUids
    }
}

impl UidSource for TimeOrderedUids {
    fn new_uid(&self, now: RowTimestamp) -> Arc<str> {
        let mut bytes = [0u8; TIME_CHARS + RANDOM_CHARS];
        let mut rest = now;
        for slot in bytes[..TIME_CHARS].iter_mut().rev() {
            *slot = ALPHABET[(rest % 64) as usize];
            rest /= 64;
        }
        let mut rng = rand::thread_rng();
        for slot in bytes[TIME_CHARS..].iter_mut() {
            *slot = ALPHABET[rng.gen_range(0..64)];
        }
        // The buffer only ever holds alphabet bytes, which are ASCII.
        Arc::from(std::str::from_utf8(&bytes).unwrap_or_default())
    }
}

/// Reads the mint timestamp back out of an id. `None` when the id is
/// too short or holds a character outside the alphabet.
pub fn uid_to_time(uid: &str) -> Option<RowTimestamp> {
    if uid.len() < TIME_CHARS {
        return None;
    }
    let mut time: RowTimestamp = 0;
    for byte in uid.as_bytes()[..TIME_CHARS].iter() {
        let digit = ALPHABET.iter().position(|c| c == byte)?;
        time = time * 64 + digit as RowTimestamp;
    }
    Some(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_sort_by_mint_time() {
        let uids = TimeOrderedUids::new();
        let early = uids.new_uid(1_000);
        let late = uids.new_uid(2_000);
        assert!(early.as_ref() < late.as_ref());
        assert_eq!(early.len(), 20);
    }

    #[test]
    fn mint_time_round_trips() {
        let uids = TimeOrderedUids::new();
        for now in [0, 1, 1_700_000_000_000, u64::from(u32::MAX)] {
            let uid = uids.new_uid(now);
            assert_eq!(uid_to_time(&uid), Some(now));
        }
    }

    #[test]
    fn malformed_ids_have_no_time() {
        assert_eq!(uid_to_time("short"), None);
        assert_eq!(uid_to_time("!!!!!!!!garbage"), None);
    }

    #[test]
    fn ids_with_equal_time_differ() {
        let uids = TimeOrderedUids::new();
        let a = uids.new_uid(5);
        let b = uids.new_uid(5);
        assert_eq!(&a[..8], &b[..8]);
        assert_ne!(a, b);
    }
}
