// src/domain/period.rs

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 半開区間 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<Self> {
        if end < start {
            return Err(AppError::InvalidPeriod(format!(
                "end ({}) is before start ({})",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 期間の日数（小数）。長さ0の期間では 0
    pub fn days(&self) -> f64 {
        self.duration().num_seconds() as f64 / 86_400.0
    }

    /// 直前に隣接する同じ長さの期間
    pub fn preceding(&self) -> Period {
        Period {
            start: self.start - self.duration(),
            end: self.start,
        }
    }

    /// 期間を粒度ごとのバケットに分割する。
    ///
    /// バケットは `start` を起点に並び、最後のバケットは `end` で切り詰められる。
    /// 隣接するバケットは境界を共有し、全バケットの和集合は期間と一致する。
    /// バケット数が `max_buckets` を超える場合は `InvalidPeriod`。
    pub fn split(&self, granularity: Granularity, max_buckets: usize) -> AppResult<Vec<Period>> {
        if granularity == Granularity::Month {
            if let Some(months) = self.whole_months(max_buckets)? {
                return Ok(self.split_months_from_end(months));
            }
        }

        let mut buckets = Vec::new();
        let mut cursor = self.start;
        let mut step = 1u32;

        while cursor < self.end {
            if buckets.len() == max_buckets {
                return Err(Self::too_many_buckets(granularity, max_buckets));
            }
            let next = match granularity.offset(self.start, step) {
                Some(boundary) if boundary > cursor => boundary.min(self.end),
                _ => self.end,
            };
            buckets.push(Period {
                start: cursor,
                end: next,
            });
            cursor = next;
            step += 1;
        }

        Ok(buckets)
    }

    /// `end` から暦月で遡ってちょうど `start` に届く場合の月数
    fn whole_months(&self, max_buckets: usize) -> AppResult<Option<u32>> {
        let mut months = 1u32;
        loop {
            let Some(boundary) = self.end.checked_sub_months(Months::new(months)) else {
                return Ok(None);
            };
            if boundary < self.start {
                return Ok(None);
            }
            if months as usize > max_buckets {
                return Err(Self::too_many_buckets(Granularity::Month, max_buckets));
            }
            if boundary == self.start {
                return Ok(Some(months));
            }
            months += 1;
        }
    }

    // 月末の丸めで端数バケットが生じないよう、境界は `end` 側から数える
    fn split_months_from_end(&self, months: u32) -> Vec<Period> {
        let boundary = |back: u32| {
            self.end
                .checked_sub_months(Months::new(back))
                .unwrap_or(self.start)
        };
        (0..months)
            .map(|i| Period {
                start: boundary(months - i),
                end: boundary(months - i - 1),
            })
            .collect()
    }

    fn too_many_buckets(granularity: Granularity, max_buckets: usize) -> AppError {
        AppError::InvalidPeriod(format!(
            "period spans more than {} {} buckets",
            max_buckets, granularity
        ))
    }
}

/// 比較対象の期間ペア
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodPair {
    pub current: Period,
    pub previous: Period,
}

impl PeriodPair {
    pub fn from_current(current: Period) -> Self {
        Self {
            previous: current.preceding(),
            current,
        }
    }
}

/// 時系列の粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// 起点から n 単位後の時刻。月は暦月で進め、月末は丸められる
    fn offset(&self, anchor: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        match self {
            Self::Day => anchor.checked_add_signed(Duration::days(n as i64)),
            Self::Week => anchor.checked_add_signed(Duration::weeks(n as i64)),
            Self::Month => anchor.checked_add_months(Months::new(n)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            other => Err(AppError::InvalidPeriod(format!(
                "unsupported granularity: {}",
                other
            ))),
        }
    }
}
