use crate::money::DateRange;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The bucket size used when grouping instances into a time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,  // ISO weeks, starting on Monday
    Month, // Calendar months
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Month
    }
}

impl Granularity {
    /// The canonical start of the bucket containing `date`.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match *self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            // Day 1 exists in every month, so this can't fail
            Granularity::Month => date - Duration::days(date.day0() as i64),
        }
    }

    /// The start of the bucket following the one that starts on `start`.
    pub fn next_start(&self, start: NaiveDate) -> NaiveDate {
        match *self {
            Granularity::Day => start + Duration::days(1),
            Granularity::Week => start + Duration::weeks(1),
            Granularity::Month => {
                let mut month = start.month() + 1;
                let mut year = start.year();

                // Reset month each year
                if month > 12 {
                    month = 1;
                    year += 1;
                }

                start
                    .with_day(1)
                    .and_then(|d| d.with_year(year))
                    .and_then(|d| d.with_month(month))
                    .unwrap_or_else(|| start + Duration::days(31))
            }
        }
    }

    /// Every bucket start touched by `range`, in ascending order.
    ///
    /// The first bucket may begin before `range.from()` (e.g. a month bucket for a range that
    /// starts mid month), but only dates inside the range are ever assigned to it.
    pub fn buckets(&self, range: &DateRange) -> Vec<NaiveDate> {
        let mut next = self.bucket_start(range.from());
        let mut starts = Vec::new();

        while next <= range.to() {
            starts.push(next);
            next = self.next_start(next);
        }

        starts
    }

    /// The display label for the bucket starting on `start`.
    pub fn label(&self, start: NaiveDate) -> String {
        match *self {
            Granularity::Day => start.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week = start.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => start.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Week => write!(f, "week"),
            Granularity::Month => write!(f, "month"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bucket_start_week_is_monday() {
        // 2000-04-06 is a Thursday
        assert_eq!(Granularity::Week.bucket_start(date(2000, 4, 6)), date(2000, 4, 3));
        assert_eq!(Granularity::Week.bucket_start(date(2000, 4, 3)), date(2000, 4, 3));
        assert_eq!(Granularity::Week.bucket_start(date(2000, 4, 9)), date(2000, 4, 3));
    }

    #[test]
    fn bucket_start_month() {
        assert_eq!(Granularity::Month.bucket_start(date(2000, 2, 29)), date(2000, 2, 1));
    }

    #[test]
    fn next_start_month_rolls_year() {
        assert_eq!(Granularity::Month.next_start(date(2000, 12, 1)), date(2001, 1, 1));
        assert_eq!(Granularity::Month.next_start(date(2000, 1, 1)), date(2000, 2, 1));
    }

    #[test]
    fn buckets_month_same_year() {
        let range = DateRange::new(date(2000, 4, 15), date(2000, 6, 2)).unwrap();
        assert_eq!(
            Granularity::Month.buckets(&range),
            vec![date(2000, 4, 1), date(2000, 5, 1), date(2000, 6, 1)]
        );
    }

    #[test]
    fn buckets_month_across_years() {
        let range = DateRange::new(date(2000, 11, 1), date(2001, 2, 1)).unwrap();
        assert_eq!(Granularity::Month.buckets(&range).len(), 4);
    }

    #[test]
    fn buckets_day_single() {
        let range = DateRange::new(date(2000, 4, 1), date(2000, 4, 1)).unwrap();
        assert_eq!(Granularity::Day.buckets(&range), vec![date(2000, 4, 1)]);
    }

    #[test]
    fn buckets_week() {
        // Sunday to the following Monday spans two ISO weeks
        let range = DateRange::new(date(2000, 4, 9), date(2000, 4, 10)).unwrap();
        assert_eq!(
            Granularity::Week.buckets(&range),
            vec![date(2000, 4, 3), date(2000, 4, 10)]
        );
    }

    #[test]
    fn labels() {
        assert_eq!(Granularity::Day.label(date(2021, 7, 2)), "2021-07-02");
        assert_eq!(Granularity::Month.label(date(2021, 7, 1)), "2021-07");
        // 2021-01-04 is the Monday of ISO week 1
        assert_eq!(Granularity::Week.label(date(2021, 1, 4)), "2021-W01");
        // ...and 2020-12-28 belongs to week 53 of 2020
        assert_eq!(Granularity::Week.label(date(2020, 12, 28)), "2020-W53");
    }
}
