use time::OffsetDateTime;

use super::Status;

/// Computes the lifecycle status of an item from its schedule. Both
/// boundaries are inclusive: an item is active at exactly `start` and at
/// exactly `end`.
///
/// `start <= end` is enforced when items are written; for an inverted range
/// the result is still one of the three date-derived statuses.
pub fn resolve(start: OffsetDateTime, end: OffsetDateTime, now: OffsetDateTime) -> Status {
    if now < start {
        Status::Scheduled
    } else if now <= end {
        Status::Active
    } else {
        Status::Closed
    }
}

/// The status every call site uses: listing, vote admission and result
/// visibility.
///
/// - A stored [`Status::Draft`] means the item is unpublished and stays a
///   draft regardless of its dates.
/// - A stored [`Status::Closed`] is a manual early close and wins over a
///   computed `scheduled` or `active`.
/// - Any other stored status is advisory; the dates decide.
pub fn effective_status(
    stored: Status,
    start: OffsetDateTime,
    end: OffsetDateTime,
    now: OffsetDateTime,
) -> Status {
    match stored {
        Status::Draft => Status::Draft,
        Status::Closed => Status::Closed,
        Status::Scheduled | Status::Active => resolve(start, end, now),
    }
}
