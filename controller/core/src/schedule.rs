//! Standard five-field cron schedules.
//!
//! Accepts minute, hour, day-of-month, month, and day-of-week fields, each a comma separated
//! list of `*`, values, `a-b` ranges, and `/n` steps; month and weekday names; and the
//! `@hourly`-style macros the cluster's scheduler understands.

use crate::{Error, Result};
use std::{fmt, str::FromStr};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    expr: String,
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
}

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: Field = Field {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
};
const HOUR: Field = Field {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
};
const DAY: Field = Field {
    name: "day of month",
    min: 1,
    max: 31,
    names: &[],
};
const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ],
};
const WEEKDAY: Field = Field {
    name: "day of week",
    min: 0,
    max: 6,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
};

impl Schedule {
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    pub fn matches_minute(&self, minute: u32) -> bool {
        self.minutes & (1 << minute) != 0
    }

    pub fn matches_hour(&self, hour: u32) -> bool {
        self.hours & (1 << hour) != 0
    }

    pub fn matches_day(&self, day: u32) -> bool {
        self.days & (1 << day) != 0
    }

    pub fn matches_month(&self, month: u32) -> bool {
        self.months & (1 << month) != 0
    }

    pub fn matches_weekday(&self, weekday: u32) -> bool {
        self.weekdays & (1 << weekday) != 0
    }
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let expr = s.trim();
        let expanded = match expr {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other if other.starts_with('@') => {
                return Err(Error::invalid(format!("unknown schedule macro: {other}")))
            }
            other => other,
        };

        let fields = expanded.split_whitespace().collect::<Vec<_>>();
        let [minute, hour, day, month, weekday] = fields[..] else {
            return Err(Error::invalid(format!(
                "schedule must have five fields, found {}: {expr:?}",
                fields.len()
            )));
        };

        Ok(Self {
            expr: expr.to_string(),
            minutes: MINUTE.parse(minute)?,
            hours: HOUR.parse(hour)?,
            days: DAY.parse(day)?,
            months: MONTH.parse(month)?,
            weekdays: WEEKDAY.parse(weekday)?,
        })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

// === impl Field ===

impl Field {
    fn parse(&self, s: &str) -> Result<u64> {
        let mut bits = 0u64;
        for item in s.split(',') {
            bits |= self.parse_item(item)?;
        }
        Ok(bits)
    }

    fn parse_item(&self, item: &str) -> Result<u64> {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step = step
                    .parse::<u32>()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| self.invalid(item))?;
                (range, Some(step))
            }
            None => (item, None),
        };

        let (lo, hi) = match range {
            "*" | "?" => (self.min, self.max),
            range => match range.split_once('-') {
                Some((lo, hi)) => (self.value(lo)?, self.value(hi)?),
                // `a/n` runs from `a` to the end of the field.
                None if step.is_some() => (self.value(range)?, self.max),
                None => {
                    let v = self.value(range)?;
                    (v, v)
                }
            },
        };
        if lo > hi {
            return Err(self.invalid(item));
        }

        let step = step.unwrap_or(1);
        let mut bits = 0u64;
        let mut v = lo;
        while v <= hi {
            bits |= 1 << v;
            v += step;
        }
        Ok(bits)
    }

    fn value(&self, s: &str) -> Result<u32> {
        let lower = s.to_ascii_lowercase();
        if let Some(i) = self.names.iter().position(|n| *n == lower) {
            return Ok(i as u32 + self.min);
        }
        s.parse::<u32>()
            .ok()
            .filter(|v| (self.min..=self.max).contains(v))
            .ok_or_else(|| self.invalid(s))
    }

    fn invalid(&self, s: &str) -> Error {
        Error::invalid(format!(
            "invalid {} in schedule: {s:?} (expected {}-{})",
            self.name, self.min, self.max
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_expressions() {
        for expr in [
            "* * * * *",
            "*/15 * * * *",
            "0 3 * * *",
            "0 0 1,15 * *",
            "30 9 * jan-mar mon-fri",
            "5/10 8-18 ? * 1-5",
            "@daily",
            "@hourly",
        ] {
            assert!(expr.parse::<Schedule>().is_ok(), "{expr}");
        }
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expr in [
            "",
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 7",
            "*/0 * * * *",
            "10-5 * * * *",
            "@fortnightly",
            "a * * * *",
        ] {
            assert!(expr.parse::<Schedule>().is_err(), "{expr}");
        }
    }

    #[test]
    fn steps_and_names_expand() {
        let s: Schedule = "*/20 9-17/4 * feb sun,sat".parse().unwrap();
        assert!(s.matches_minute(0) && s.matches_minute(20) && s.matches_minute(40));
        assert!(!s.matches_minute(10));
        assert!(s.matches_hour(9) && s.matches_hour(13) && s.matches_hour(17));
        assert!(!s.matches_hour(10));
        assert!(s.matches_month(2) && !s.matches_month(1));
        assert!(s.matches_weekday(0) && s.matches_weekday(6) && !s.matches_weekday(3));
        assert_eq!(s.as_str(), "*/20 9-17/4 * feb sun,sat");
    }

    #[test]
    fn macros_keep_their_spelling() {
        let s: Schedule = "@weekly".parse().unwrap();
        assert_eq!(s.to_string(), "@weekly");
        assert!(s.matches_weekday(0) && !s.matches_weekday(1));
    }
}
