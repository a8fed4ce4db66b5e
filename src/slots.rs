use std::collections::HashMap;

/// Shop hours: half-hour slots from 10:00 through 20:00 inclusive, with the
/// 14:00-15:00 lunch hour closed.
pub const OPENING_HOUR: u32 = 10;
pub const CLOSING_HOUR: u32 = 20;
pub const LUNCH_START_HOUR: u32 = 14;
pub const LUNCH_END_HOUR: u32 = 15;
pub const SLOT_MINUTES: u32 = 30;

/// The bookable time grid for any day. Purely a function of the shop-hour
/// constants; every call yields the identical ordered sequence.
pub fn daily_slots() -> Vec<String> {
    let mut slots = Vec::new();
    let mut hour = OPENING_HOUR;
    let mut minute = 0;

    while hour < CLOSING_HOUR || (hour == CLOSING_HOUR && minute == 0) {
        if (LUNCH_START_HOUR..LUNCH_END_HOUR).contains(&hour) {
            hour += 1;
            continue;
        }
        slots.push(format!("{hour:02}:{minute:02}"));
        minute += SLOT_MINUTES;
        if minute >= 60 {
            minute -= 60;
            hour += 1;
        }
    }

    slots
}

/// `date` is `YYYY-MM-DD`, `time` is `HH:MM`; together they sort
/// chronologically as plain strings.
pub fn slot_key(date: &str, time: &str) -> String {
    format!("{date}-{time}")
}

/// Identity key of a booking record, and the uniqueness constraint that
/// keeps a slot from being booked twice.
pub fn record_key(slot_key: &str, shop_id: &str) -> String {
    format!("{slot_key}{shop_id}")
}

/// In-memory projection of which (shop, slot) pairs are currently booked.
/// Rebuilt wholesale from the appointment store on every change
/// notification; a cache, never the source of truth.
#[derive(Debug, Clone, Default)]
pub struct ReservationIndex {
    reserved: HashMap<String, bool>,
}

impl ReservationIndex {
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let reserved = keys.into_iter().map(|key| (key, true)).collect();
        Self { reserved }
    }

    /// Pure lookup against this snapshot; no I/O.
    pub fn is_reserved(&self, shop_id: &str, slot_key: &str) -> bool {
        self.reserved
            .get(&record_key(slot_key, shop_id))
            .copied()
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_slots_matches_shop_hours() {
        let expected = vec![
            "10:00", "10:30", "11:00", "11:30", "12:00", "12:30", "13:00", "13:30", "15:00",
            "15:30", "16:00", "16:30", "17:00", "17:30", "18:00", "18:30", "19:00", "19:30",
            "20:00",
        ];
        assert_eq!(daily_slots(), expected);
    }

    #[test]
    fn daily_slots_is_idempotent() {
        assert_eq!(daily_slots(), daily_slots());
        assert_eq!(daily_slots().len(), 19);
    }

    #[test]
    fn daily_slots_skips_lunch_and_includes_closing() {
        let slots = daily_slots();
        assert!(!slots.iter().any(|slot| slot.starts_with("14:")));
        assert_eq!(slots.last().map(String::as_str), Some("20:00"));
    }

    #[test]
    fn keys_compose() {
        let key = slot_key("2024-05-01", "10:30");
        assert_eq!(key, "2024-05-01-10:30");
        assert_eq!(record_key(&key, "Fade-joe@cut.io"), "2024-05-01-10:30Fade-joe@cut.io");
    }

    #[test]
    fn index_reports_only_booked_pairs() {
        let key = slot_key("2024-05-01", "10:30");
        let index = ReservationIndex::from_keys([record_key(&key, "shop-a")]);

        assert!(index.is_reserved("shop-a", &key));
        assert!(!index.is_reserved("shop-b", &key));
        assert!(!index.is_reserved("shop-a", &slot_key("2024-05-01", "11:00")));
    }

    #[test]
    fn empty_index_reserves_nothing() {
        let index = ReservationIndex::default();
        assert!(index.is_empty());
        assert!(!index.is_reserved("shop-a", "2024-05-01-10:00"));
    }
}
