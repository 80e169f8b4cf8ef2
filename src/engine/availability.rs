use crate::model::*;

// ── Free-window arithmetic over sorted spans ─────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both must be sorted by start; `to_remove` merged.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = to_remove[j];
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

/// Free parts of `window` given the vehicle's holding reservations.
pub(super) fn free_windows(window: &Span, reservations: &[Reservation]) -> Vec<Span> {
    let mut taken: Vec<Span> = reservations
        .iter()
        .filter(|r| r.is_blocking())
        .filter_map(|r| r.span.clamp_to(window))
        .collect();
    taken.sort_by_key(|s| s.start);
    subtract_intervals(&[*window], &merge_overlapping(&taken))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;

    fn held(start: Ms, end: Ms, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            resource_id: Ulid::nil(),
            span: Span::new(start, end),
            holder: "instructor-9".into(),
            purpose: "lesson".into(),
            status,
        }
    }

    #[test]
    fn merge_joins_adjacent_and_overlapping() {
        let merged = merge_overlapping(&[
            Span::new(0, 10),
            Span::new(10, 20),
            Span::new(15, 30),
            Span::new(40, 50),
        ]);
        assert_eq!(merged, vec![Span::new(0, 30), Span::new(40, 50)]);
    }

    #[test]
    fn subtract_cuts_holes() {
        let free = subtract_intervals(
            &[Span::new(0, 100)],
            &[Span::new(10, 20), Span::new(50, 60)],
        );
        assert_eq!(
            free,
            vec![Span::new(0, 10), Span::new(20, 50), Span::new(60, 100)]
        );
    }

    #[test]
    fn subtract_everything() {
        assert!(subtract_intervals(&[Span::new(10, 20)], &[Span::new(0, 30)]).is_empty());
    }

    #[test]
    fn subtract_across_several_bases() {
        let free = subtract_intervals(
            &[Span::new(0, 10), Span::new(20, 30)],
            &[Span::new(5, 25)],
        );
        assert_eq!(free, vec![Span::new(0, 5), Span::new(25, 30)]);
    }

    #[test]
    fn free_windows_ignores_terminal_reservations() {
        let day = Span::new(8 * H, 18 * H);
        let reservations = vec![
            held(7 * H, 9 * H, ReservationStatus::Active),
            held(12 * H, 13 * H, ReservationStatus::Canceled),
            held(14 * H, 15 * H, ReservationStatus::Scheduled),
            held(17 * H, 20 * H, ReservationStatus::Scheduled),
        ];
        assert_eq!(
            free_windows(&day, &reservations),
            vec![Span::new(9 * H, 14 * H), Span::new(15 * H, 17 * H)]
        );
    }

    #[test]
    fn free_windows_on_empty_timeline() {
        let day = Span::new(0, 24 * H);
        assert_eq!(free_windows(&day, &[]), vec![day]);
    }
}
