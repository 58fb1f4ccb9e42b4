//! Occurrence date generation for each pattern kind.

use super::{Occurrence, PatternKind, RecurringPattern, WeekdayMask, MINUTES_PER_DAY};
use crate::timezone::utc_to_local;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

/// Hard cap on candidate dates examined per lookup. Deletions are bounded
/// by `MAX_INSTANCE_COUNT`, so this is never reached by valid data.
const MAX_CANDIDATES: usize = 4 * super::MAX_INSTANCE_COUNT as usize;

impl RecurringPattern {
    /// First undeleted, in-range instance of the rule whose end is after
    /// `now`. Exceptions are not considered here.
    pub(super) fn next_computed(&self, now: DateTime<Utc>) -> Option<Occurrence> {
        // An instance that started a few days ago may still be running.
        let span_days = i64::from(self.end_offset / MINUTES_PER_DAY) + 1;
        let local_today = utc_to_local(now, self.time_zone).date();
        let from = std::cmp::max(self.start_date, local_today - Duration::days(span_days));

        let mut cursor = DateCursor::new(self, from);
        for _ in 0..MAX_CANDIDATES {
            let date = cursor.next_date()?;
            if date < from {
                continue;
            }
            if !self.never_ends() && date > self.end_date {
                return None;
            }
            if self.is_deleted(date) {
                continue;
            }
            let occurrence = self.occurrence_on(date);
            if occurrence.end > now {
                return Some(occurrence);
            }
        }
        tracing::warn!(kind = %self.kind, "Gave up searching for next occurrence");
        None
    }
}

/// Walks rule dates in ascending order, starting close to `from`.
///
/// Dates before `from` (and before the series start) may still be yielded
/// for the first period block; callers filter them.
struct DateCursor<'a> {
    pattern: &'a RecurringPattern,
    state: CursorState,
}

enum CursorState {
    Day(NaiveDate),
    Week {
        anchor: NaiveDate,
        block: i64,
        slot: i64,
    },
    Month(i64),
    Done,
}

impl<'a> DateCursor<'a> {
    fn new(pattern: &'a RecurringPattern, from: NaiveDate) -> Self {
        let period = i64::from(pattern.period.max(1));
        let start = pattern.start_date;

        let state = match pattern.kind {
            PatternKind::Daily => {
                let elapsed = (from - start).num_days().max(0);
                let steps = (elapsed + period - 1) / period;
                match start.checked_add_signed(Duration::days(steps * period)) {
                    Some(date) => CursorState::Day(date),
                    None => CursorState::Done,
                }
            }
            PatternKind::Weekly { days } if days.is_empty() => CursorState::Done,
            PatternKind::Weekly { .. } => {
                let anchor = week_start(start, pattern.first_dow);
                let weeks = (week_start(from, pattern.first_dow) - anchor).num_days().max(0) / 7;
                CursorState::Week {
                    anchor,
                    block: weeks / period * period,
                    slot: 0,
                }
            }
            PatternKind::MonthNth { days, .. } if days.is_empty() => CursorState::Done,
            PatternKind::Monthly { .. } | PatternKind::MonthEnd | PatternKind::MonthNth { .. } => {
                let first = RecurringPattern::month_index(start);
                let months = (RecurringPattern::month_index(from) - first).max(0);
                CursorState::Month(first + months / period * period)
            }
        };

        Self { pattern, state }
    }

    fn next_date(&mut self) -> Option<NaiveDate> {
        let period = i64::from(self.pattern.period.max(1));
        loop {
            match &mut self.state {
                CursorState::Done => return None,
                CursorState::Day(date) => {
                    let current = *date;
                    match current.checked_add_signed(Duration::days(period)) {
                        Some(next) => *date = next,
                        None => self.state = CursorState::Done,
                    }
                    return Some(current);
                }
                CursorState::Week {
                    anchor,
                    block,
                    slot,
                } => {
                    let days = match self.pattern.kind {
                        PatternKind::Weekly { days } => days,
                        _ => return None,
                    };
                    if *slot >= 7 {
                        *block += period;
                        *slot = 0;
                        continue;
                    }
                    let date = anchor.checked_add_signed(Duration::days(*block * 7 + *slot));
                    *slot += 1;
                    match date {
                        Some(date) if days.contains(date.weekday()) => {
                            if date < self.pattern.start_date {
                                continue;
                            }
                            return Some(date);
                        }
                        Some(_) => continue,
                        None => {
                            self.state = CursorState::Done;
                            return None;
                        }
                    }
                }
                CursorState::Month(index) => {
                    let current = *index;
                    *index += period;
                    let (year, month) = split_month_index(current);
                    let date = match self.pattern.kind {
                        PatternKind::Monthly { day } => clamped_day(year, month, day),
                        PatternKind::MonthEnd => last_day_of_month(year, month),
                        PatternKind::MonthNth { days, nth } => nth_day_of_month(year, month, days, nth),
                        _ => None,
                    };
                    match date {
                        Some(date) if date >= self.pattern.start_date => return Some(date),
                        Some(_) => continue,
                        None if year > 9999 => {
                            self.state = CursorState::Done;
                            return None;
                        }
                        None => continue,
                    }
                }
            }
        }
    }
}

/// First day of the week containing `date`, weeks starting on `first_dow`.
fn week_start(date: NaiveDate, first_dow: Weekday) -> NaiveDate {
    let offset = (7 + date.weekday().num_days_from_sunday() - first_dow.num_days_from_sunday()) % 7;
    date - Duration::days(i64::from(offset))
}

fn split_month_index(index: i64) -> (i32, u32) {
    let year = index.div_euclid(12) as i32;
    let month = index.rem_euclid(12) as u32 + 1;
    (year, month)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|d| d.pred_opt())
}

/// `day` of the month, clamped to the month's last day (day 31 in
/// February becomes the 28th or 29th).
fn clamped_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = last_day_of_month(year, month)?;
    if day == 0 || day >= last.day() {
        return Some(last);
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// The `nth` day of the month whose weekday is in `days`; `nth >= 5` picks
/// the last such day.
fn nth_day_of_month(year: i32, month: u32, days: WeekdayMask, nth: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = last_day_of_month(year, month)?;
    let qualifying: Vec<NaiveDate> = first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| days.contains(d.weekday()))
        .collect();

    if nth >= 5 {
        return qualifying.last().copied();
    }
    let index = nth.saturating_sub(1) as usize;
    qualifying.get(index).or_else(|| qualifying.last()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_start() {
        // 2025-01-08 is a Wednesday.
        assert_eq!(week_start(date(2025, 1, 8), Weekday::Sun), date(2025, 1, 5));
        assert_eq!(week_start(date(2025, 1, 8), Weekday::Mon), date(2025, 1, 6));
        assert_eq!(week_start(date(2025, 1, 6), Weekday::Mon), date(2025, 1, 6));
    }

    #[test]
    fn test_clamped_day() {
        assert_eq!(clamped_day(2025, 2, 31), Some(date(2025, 2, 28)));
        assert_eq!(clamped_day(2024, 2, 31), Some(date(2024, 2, 29)));
        assert_eq!(clamped_day(2025, 4, 31), Some(date(2025, 4, 30)));
        assert_eq!(clamped_day(2025, 5, 15), Some(date(2025, 5, 15)));
    }

    #[test]
    fn test_nth_day_of_month() {
        let tuesday = WeekdayMask::from_days(&[Weekday::Tue]);
        assert_eq!(nth_day_of_month(2025, 3, tuesday, 2), Some(date(2025, 3, 11)));
        assert_eq!(nth_day_of_month(2025, 3, tuesday, 5), Some(date(2025, 3, 25)));

        let weekdays = WeekdayMask::from_bits(0x3E);
        assert_eq!(nth_day_of_month(2025, 3, weekdays, 1), Some(date(2025, 3, 3)));
        assert_eq!(nth_day_of_month(2025, 3, weekdays, 5), Some(date(2025, 3, 31)));
    }

    #[test]
    fn test_split_month_index() {
        assert_eq!(split_month_index(2025 * 12), (2025, 1));
        assert_eq!(split_month_index(2025 * 12 + 11), (2025, 12));
    }
}
