// src/service/period_calculator.rs

use crate::domain::period::{Period, PeriodPair};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Months, NaiveTime, Utc};

/// 期間が指定されなかった場合の既定の長さ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultSpan {
    /// 当日 0:00 (UTC) から
    Today,
    Days(i64),
    /// 暦月で遡る
    Months(u32),
}

impl DefaultSpan {
    /// `end` から既定の長さだけ遡った開始時刻
    pub fn start_before(&self, end: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        let start = match self {
            Self::Today => Some(start_of_day(end)),
            Self::Days(n) => end.checked_sub_signed(Duration::days(*n)),
            Self::Months(n) => end.checked_sub_months(Months::new(*n)),
        };
        start.ok_or_else(|| AppError::InvalidPeriod(format!("span {:?} is out of range", self)))
    }
}

/// その日の 0:00 (UTC)
pub fn start_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

pub struct PeriodCalculator;

impl PeriodCalculator {
    /// 明示された境界と既定の長さから現在期間と比較期間を求める
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        span: DefaultSpan,
        now: DateTime<Utc>,
    ) -> AppResult<PeriodPair> {
        let current = match (start, end) {
            (Some(start), Some(end)) => Period::new(start, end)?,
            (Some(start), None) => Period::new(start, now)?,
            (None, Some(end)) => Period::new(span.start_before(end)?, end)?,
            (None, None) => Period::new(span.start_before(now)?, now)?,
        };

        Ok(PeriodPair::from_current(current))
    }
}
