// Copyright 2025 Alejandro Martínez Corriá and the Thinkube contributors
// SPDX-License-Identifier: Apache-2.0

const MILLION: u64 = 1_000_000;
const THOUSAND: u64 = 1_000;

/// Compact download count: `2.5M`, `45.2k` or the plain number below 1000.
///
/// One decimal place. The quotient is an `f64` and rounds to the nearest
/// tenth by its exact binary value, with exact ties going up, so `1150`
/// (stored as 1.14999…) gives `1.1k` and `1250` gives `1.3k`.
pub fn format_downloads(count: u64) -> String {
    if count >= MILLION {
        format!("{}M", one_decimal(count, MILLION))
    } else if count >= THOUSAND {
        format!("{}k", one_decimal(count, THOUSAND))
    } else {
        count.to_string()
    }
}

fn one_decimal(value: u64, unit: u64) -> String {
    let quotient = value as f64 / unit as f64;

    // A tenth-tie is exactly representable only as an odd multiple of 0.25.
    let quarters = quotient * 4.0;
    if quarters.fract() == 0.0 && quarters % 2.0 == 1.0 {
        let tenths = (quotient * 10.0).ceil() as u64;
        return format!("{}.{}", tenths / 10, tenths % 10);
    }

    format!("{:.1}", quotient)
}
