use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::util::error::InputError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// 取得対象のリリース日範囲（両端を含む）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// # Errors
    /// `start` が `end` より後の場合は [`InputError::InvertedWindow`] を返す。
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InputError> {
        if start > end {
            return Err(InputError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// `YYYY-MM-DD` 形式の文字列から範囲を作る。
    ///
    /// # Errors
    /// どちらかの日付がパースできない場合、または範囲が逆転している場合はエラーを返す。
    pub fn parse(start: &str, end: &str) -> Result<Self, InputError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// 基準日の前後に広がる範囲を作る。
    #[must_use]
    pub fn around(reference: NaiveDate, backward_days: u32, forward_days: u32) -> Self {
        Self {
            start: shift_back(reference, backward_days),
            end: shift_forward(reference, forward_days),
        }
    }

    /// 両側に `days` 日ずつ広げた範囲を返す。
    #[must_use]
    pub fn widen(&self, days: u32) -> Self {
        Self {
            start: shift_back(self.start, days),
            end: shift_forward(self.end, days),
        }
    }

    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// 範囲に含まれる日数。
    #[must_use]
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, InputError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| InputError::InvalidDate {
        value: value.to_string(),
    })
}

fn shift_back(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

fn shift_forward(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}
