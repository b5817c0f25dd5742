/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! formatting and parsing helpers for the `Date` term type, stored internally
//! as seconds since `UNIX_EPOCH`

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// formats a timestamp (seconds since `UNIX_EPOCH`) as RFC 3339, falling back
/// to the raw integer if it falls outside the range representable by `time`
pub fn format_date(timestamp: u64) -> String {
    match OffsetDateTime::from_unix_timestamp(timestamp as i64) {
        Ok(date) => date
            .format(&Rfc3339)
            .unwrap_or_else(|_| timestamp.to_string()),
        Err(_) => timestamp.to_string(),
    }
}

/// parses an RFC 3339 date string into seconds since `UNIX_EPOCH`
pub fn parse_date(s: &str) -> Result<u64, time::error::Parse> {
    let date = OffsetDateTime::parse(s, &Rfc3339)?;
    Ok(date.unix_timestamp().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let formatted = format_date(1_700_000_000);
        let parsed = parse_date(&formatted).unwrap();
        assert_eq!(parsed, 1_700_000_000);
    }
}
