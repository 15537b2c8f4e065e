use chrono::{Duration, Local, NaiveDateTime, NaiveTime, Timelike};

/// Local hours offered each day, in order.
pub const DEFAULT_HOURS: [u32; 3] = [9, 11, 14];

const SLOT_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Source of candidate appointment slots. Swappable for a real scheduling
/// backend without touching the conversation machine.
pub trait SlotProvider: Send + Sync {
    fn get_next_slots(&self, days: i64, per_day: i64) -> Vec<String>;
}

/// Fixed daily hours starting today, based on the local clock.
#[derive(Debug, Clone)]
pub struct CalendarSlots {
    hours: Vec<u32>,
}

impl CalendarSlots {
    pub fn new(hours: Vec<u32>) -> Self {
        Self { hours }
    }
}

impl Default for CalendarSlots {
    fn default() -> Self {
        Self::new(DEFAULT_HOURS.to_vec())
    }
}

impl SlotProvider for CalendarSlots {
    fn get_next_slots(&self, days: i64, per_day: i64) -> Vec<String> {
        slots_from(Local::now().naive_local(), &self.hours, days, per_day)
    }
}

/// Same calendar arithmetic as [`CalendarSlots`] but anchored to a fixed
/// instant, for deterministic runs.
#[derive(Debug, Clone)]
pub struct FixedClockSlots {
    now: NaiveDateTime,
    hours: Vec<u32>,
}

impl FixedClockSlots {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now,
            hours: DEFAULT_HOURS.to_vec(),
        }
    }
}

impl SlotProvider for FixedClockSlots {
    fn get_next_slots(&self, days: i64, per_day: i64) -> Vec<String> {
        slots_from(self.now, &self.hours, days, per_day)
    }
}

/// Slots for `days` calendar days starting at the day of `now`, at most
/// `per_day` hours each, ordered by day then hour. Non-positive counts give
/// an empty list.
pub fn slots_from(now: NaiveDateTime, hours: &[u32], days: i64, per_day: i64) -> Vec<String> {
    if days <= 0 || per_day <= 0 {
        return vec![];
    }

    let base = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let mut sorted_hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
    sorted_hours.sort_unstable();
    sorted_hours.dedup();
    let take = usize::try_from(per_day).unwrap_or(usize::MAX);

    let mut slots = vec![];
    for offset in 0..days {
        let day = base.date() + Duration::days(offset);
        for hour in sorted_hours.iter().take(take) {
            if let Some(time) = NaiveTime::from_hms_opt(*hour, 0, 0) {
                slots.push(day.and_time(time).format(SLOT_FORMAT).to_string());
            }
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_three_by_three() {
        let slots = slots_from(dt("2025-05-20 10:37"), &DEFAULT_HOURS, 3, 3);
        assert_eq!(
            slots,
            vec![
                "2025-05-20T09:00",
                "2025-05-20T11:00",
                "2025-05-20T14:00",
                "2025-05-21T09:00",
                "2025-05-21T11:00",
                "2025-05-21T14:00",
                "2025-05-22T09:00",
                "2025-05-22T11:00",
                "2025-05-22T14:00",
            ]
        );
    }

    #[test]
    fn test_per_day_truncates_hours() {
        let slots = slots_from(dt("2025-05-20 08:00"), &DEFAULT_HOURS, 2, 2);
        assert_eq!(
            slots,
            vec![
                "2025-05-20T09:00",
                "2025-05-20T11:00",
                "2025-05-21T09:00",
                "2025-05-21T11:00",
            ]
        );
    }

    #[test]
    fn test_per_day_larger_than_hour_list() {
        let slots = slots_from(dt("2025-05-20 08:00"), &DEFAULT_HOURS, 1, 10);
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn test_crosses_month_boundary() {
        let slots = slots_from(dt("2025-05-31 23:59"), &DEFAULT_HOURS, 2, 1);
        assert_eq!(slots, vec!["2025-05-31T09:00", "2025-06-01T09:00"]);
    }

    #[test]
    fn test_non_positive_arguments_are_empty() {
        let now = dt("2025-05-20 08:00");
        assert!(slots_from(now, &DEFAULT_HOURS, 0, 3).is_empty());
        assert!(slots_from(now, &DEFAULT_HOURS, 3, 0).is_empty());
        assert!(slots_from(now, &DEFAULT_HOURS, -1, -5).is_empty());
    }

    #[test]
    fn test_unsorted_hours_are_ordered() {
        let slots = slots_from(dt("2025-05-20 08:00"), &[14, 9], 1, 3);
        assert_eq!(slots, vec!["2025-05-20T09:00", "2025-05-20T14:00"]);
    }

    #[test]
    fn test_fixed_clock_provider() {
        let provider = FixedClockSlots::new(dt("2025-05-20 12:00"));
        assert_eq!(provider.get_next_slots(3, 3).len(), 9);
        assert_eq!(provider.get_next_slots(3, 3)[0], "2025-05-20T09:00");
    }

    #[test]
    fn test_calendar_provider_is_ordered() {
        let slots = CalendarSlots::default().get_next_slots(3, 3);
        assert_eq!(slots.len(), 9);
        let mut sorted = slots.clone();
        sorted.sort();
        assert_eq!(slots, sorted);
    }
}
