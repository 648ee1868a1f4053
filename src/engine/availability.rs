use crate::model::*;

// ── Availability ─────────────────────────────────────────────────

/// First pending/approved booking overlapping `span`, skipping `exclude`.
pub fn first_conflict<'a>(room: &'a RoomState, span: &Span, exclude: Option<ulid::Ulid>) -> Option<&'a Booking> {
    room.overlapping(*span)
        .find(|b| b.status.holds_slot() && Some(b.id) != exclude)
}

/// True iff no slot-holding booking other than `exclude` overlaps `span`.
pub fn is_available(room: &RoomState, span: &Span, exclude: Option<ulid::Ulid>) -> bool {
    first_conflict(room, span, exclude).is_none()
}

/// Free sub-intervals of `window`: the window minus every slot-holding booking.
pub fn free_slots(room: &RoomState, window: &Span) -> Vec<Span> {
    let mut taken: Vec<Span> = room
        .overlapping(*window)
        .filter(|b| b.status.holds_slot())
        .filter_map(|b| b.span.clamp_to(window))
        .collect();
    taken.sort_by_key(|s| s.start);
    let taken = merge_overlapping(&taken);
    subtract_intervals(&[*window], &taken)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Remove sorted `to_remove` spans from sorted, disjoint `base` spans.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
