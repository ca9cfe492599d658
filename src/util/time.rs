use chrono::{NaiveDate, Utc};

/// UTC基準の「今日」の日付。
#[must_use]
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
