use crate::limits::HOUR_MS;
use crate::model::TimeSlot;

/// Busy slots (ordered by start) followed by the free gaps between them.
///
/// A gap becomes a free slot only if it is longer than one hour; a gap of
/// exactly an hour, shorter gaps and overlaps are dropped. Busy slots come first and free slots
/// after, not interleaved; existing clients rely on that order.
pub fn derive_free_slots(busy: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut out = Vec::with_capacity(busy.len() * 2);
    out.extend_from_slice(busy);

    for pair in busy.windows(2) {
        let (cur, next) = (pair[0], pair[1]);
        if next.start - cur.end > HOUR_MS {
            out.push(TimeSlot::free(cur.end, next.start));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::MINUTE_MS;

    const DAY: i64 = 1_717_372_800_000; // 2024-06-03T00:00:00Z

    fn at(h: i64, m: i64) -> i64 {
        DAY + h * HOUR_MS + m * MINUTE_MS
    }

    #[test]
    fn two_hour_gap_yields_one_free_slot() {
        let busy = [
            TimeSlot::busy(at(9, 0), at(10, 0)),
            TimeSlot::busy(at(12, 0), at(13, 0)),
        ];
        let slots = derive_free_slots(&busy);
        assert_eq!(
            slots,
            vec![busy[0], busy[1], TimeSlot::free(at(10, 0), at(12, 0))]
        );
    }

    #[test]
    fn short_gap_is_dropped() {
        let busy = [
            TimeSlot::busy(at(9, 0), at(10, 0)),
            TimeSlot::busy(at(10, 10), at(11, 0)),
        ];
        assert_eq!(derive_free_slots(&busy), busy.to_vec());
    }

    #[test]
    fn exactly_one_hour_is_not_free() {
        let busy = [
            TimeSlot::busy(at(9, 0), at(10, 0)),
            TimeSlot::busy(at(11, 0), at(12, 0)),
            TimeSlot::busy(at(14, 0), at(15, 0)),
        ];
        let free: Vec<_> = derive_free_slots(&busy).into_iter().filter(|s| !s.busy).collect();
        assert_eq!(free, vec![TimeSlot::free(at(12, 0), at(14, 0))]);
    }

    #[test]
    fn gap_just_under_or_over_an_hour() {
        let busy = [
            TimeSlot::busy(at(9, 0), at(10, 0)),
            TimeSlot::busy(at(10, 59), at(12, 0)),
            TimeSlot::busy(at(13, 30), at(14, 0)),
        ];
        let free: Vec<_> = derive_free_slots(&busy).into_iter().filter(|s| !s.busy).collect();
        assert_eq!(free, vec![TimeSlot::free(at(12, 0), at(13, 30))]);
    }

    #[test]
    fn busy_first_then_free() {
        let busy = [
            TimeSlot::busy(at(8, 0), at(9, 0)),
            TimeSlot::busy(at(11, 0), at(12, 0)),
            TimeSlot::busy(at(14, 0), at(15, 0)),
        ];
        let slots = derive_free_slots(&busy);
        assert_eq!(slots.len(), 5);
        assert!(slots[..3].iter().all(|s| s.busy));
        assert!(slots[3..].iter().all(|s| !s.busy));
        assert_eq!(slots[3], TimeSlot::free(at(9, 0), at(11, 0)));
        assert_eq!(slots[4], TimeSlot::free(at(12, 0), at(14, 0)));
    }

    #[test]
    fn zero_or_one_busy_slot_has_no_gaps() {
        assert!(derive_free_slots(&[]).is_empty());
        let one = [TimeSlot::busy(at(9, 0), at(10, 0))];
        assert_eq!(derive_free_slots(&one), one.to_vec());
    }

    #[test]
    fn overlap_is_not_a_gap() {
        let busy = [
            TimeSlot::busy(at(9, 0), at(12, 0)),
            TimeSlot::busy(at(10, 0), at(11, 0)),
        ];
        assert_eq!(derive_free_slots(&busy).len(), 2);
    }
}
