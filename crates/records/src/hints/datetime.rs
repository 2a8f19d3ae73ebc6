// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Date and time hint grammar.
//!
//! Hints spell formats the way the database vendors do (`YYYY-MM-DD`,
//! `HH24:MI:SS`, trailing `OF` for a UTC offset). Each value maps onto a
//! chrono strftime string for local encoding and decoding.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateFormat {
    YyyyMmDd,
    MmDdYyyy,
    DdMmYyyy,
    MmDdYy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFormat {
    Hh24MiSs,
    HhMiSs,
    Hh12MiAm,
    /// Only valid as the time half of a datetime format
    Hh24Mi,
}

/// `<date> <time>[OF]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTimeFormat {
    pub date: DateFormat,
    pub time: TimeFormat,
    pub offset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatParseError(pub String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized format: {}", self.0)
    }
}

impl std::error::Error for FormatParseError {}

impl DateFormat {
    pub const ALL: [DateFormat; 4] = [
        DateFormat::YyyyMmDd,
        DateFormat::MmDdYyyy,
        DateFormat::DdMmYyyy,
        DateFormat::MmDdYy,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DateFormat::YyyyMmDd => "YYYY-MM-DD",
            DateFormat::MmDdYyyy => "MM-DD-YYYY",
            DateFormat::DdMmYyyy => "DD-MM-YYYY",
            DateFormat::MmDdYy => "MM/DD/YY",
        }
    }

    #[must_use]
    pub fn chrono_format(self) -> &'static str {
        match self {
            DateFormat::YyyyMmDd => "%Y-%m-%d",
            DateFormat::MmDdYyyy => "%m-%d-%Y",
            DateFormat::DdMmYyyy => "%d-%m-%Y",
            DateFormat::MmDdYy => "%m/%d/%y",
        }
    }

    /// Month before day
    #[must_use]
    pub fn is_month_first(self) -> bool {
        matches!(self, DateFormat::MmDdYyyy | DateFormat::MmDdYy)
    }
}

impl TimeFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFormat::Hh24MiSs => "HH24:MI:SS",
            TimeFormat::HhMiSs => "HH:MI:SS",
            TimeFormat::Hh12MiAm => "HH12:MI AM",
            TimeFormat::Hh24Mi => "HH24:MI",
        }
    }

    #[must_use]
    pub fn chrono_format(self) -> &'static str {
        match self {
            TimeFormat::Hh24MiSs | TimeFormat::HhMiSs => "%H:%M:%S",
            TimeFormat::Hh12MiAm => "%I:%M %p",
            TimeFormat::Hh24Mi => "%H:%M",
        }
    }

    /// Formats accepted for the `timeonlyformat` hint
    #[must_use]
    pub fn allowed_time_only(self) -> bool {
        !matches!(self, TimeFormat::Hh24Mi)
    }

    /// 24 hour clock with seconds, the form every vendor emits
    #[must_use]
    pub fn is_24h_seconds(self) -> bool {
        matches!(self, TimeFormat::Hh24MiSs | TimeFormat::HhMiSs)
    }
}

impl DateTimeFormat {
    #[must_use]
    pub const fn new(date: DateFormat, time: TimeFormat, offset: bool) -> Self {
        Self { date, time, offset }
    }

    #[must_use]
    pub fn chrono_format(&self) -> String {
        let mut s = format!("{} {}", self.date.chrono_format(), self.time.chrono_format());
        if self.offset {
            s.push_str("%:z");
        }
        s
    }

    /// ISO-ordered date with a 24 hour clock including seconds
    #[must_use]
    pub fn is_iso_like(&self) -> bool {
        self.date == DateFormat::YyyyMmDd && self.time.is_24h_seconds()
    }

    #[must_use]
    pub fn without_offset(&self) -> Self {
        Self {
            offset: false,
            ..*self
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DateTimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)?;
        if self.offset {
            f.write_str("OF")?;
        }
        Ok(())
    }
}

impl FromStr for DateFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateFormat::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| FormatParseError(s.to_string()))
    }
}

impl FromStr for TimeFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HH24:MI:SS" => Ok(TimeFormat::Hh24MiSs),
            "HH:MI:SS" => Ok(TimeFormat::HhMiSs),
            "HH12:MI AM" => Ok(TimeFormat::Hh12MiAm),
            "HH24:MI" => Ok(TimeFormat::Hh24Mi),
            _ => Err(FormatParseError(s.to_string())),
        }
    }
}

impl FromStr for DateTimeFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || FormatParseError(s.to_string());
        let (date, rest) = s.split_once(' ').ok_or_else(err)?;
        let (time, offset) = match rest.strip_suffix("OF") {
            Some(time) => (time, true),
            None => (rest, false),
        };
        Ok(DateTimeFormat {
            date: date.parse().map_err(|_| err())?,
            time: time.parse().map_err(|_| err())?,
            offset,
        })
    }
}
