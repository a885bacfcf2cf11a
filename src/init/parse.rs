// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDate;
use tower::BoxError;

use crate::receivers::gamelog::DAY_FORMAT;

/// Parse a `YYYY-MM-DD` day
pub fn parse_day(s: &str) -> Result<NaiveDate, BoxError> {
    NaiveDate::parse_from_str(s.trim(), DAY_FORMAT)
        .map_err(|e| format!("invalid day `{}`, expected YYYY-MM-DD: {}", s, e).into())
}
