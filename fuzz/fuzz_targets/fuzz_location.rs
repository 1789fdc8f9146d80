// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for Location parsing and key composition

#![no_main]

use libfuzzer_sys::fuzz_target;
use sst_core::location::{normalize_prefix, Location};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let _ = normalize_prefix(input);

    if let Ok(location) = Location::parse(input) {
        let rendered = location.to_string();

        if let Location::ObjectStore { prefix, .. } = &location {
            assert!(!prefix.starts_with('/'));
            assert!(prefix.is_empty() || prefix.ends_with('/'));
            assert!(!prefix.contains("//"));

            // Object-store locations survive a render/parse cycle.
            let reparsed = Location::parse(&rendered).expect("rendered location parses");
            assert_eq!(reparsed, location);
        }

        // Compose keys and paths from the tail of the input
        let tail = input.rsplit('/').next().unwrap_or(input);
        if let Some(key) = location.object_key(tail) {
            let _ = location.relative_key(&key);
        }
        let _ = location.file_path(tail);
    }
});
