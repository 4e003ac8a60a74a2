use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{is_eligible, BallotItem, DefaultEligibility, Faculty, Selection, Status};

/// A ballot item together with its status at the time of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemWithStatus {
    #[serde(flatten)]
    pub item: BallotItem,
    pub computed_status: Status,
}

impl ItemWithStatus {
    pub fn new(item: BallotItem, now: OffsetDateTime) -> Self {
        let computed_status = item.effective_status(now);
        Self {
            item,
            computed_status,
        }
    }
}

fn status_rank(status: Status) -> u8 {
    match status {
        Status::Active => 0,
        Status::Scheduled => 1,
        Status::Closed => 2,
        Status::Draft => 3,
    }
}

/// The items a voter with `voter_faculty` gets to see at `now`: published
/// items the voter is eligible for, active first, then scheduled, then
/// closed, each group by start time.
pub fn visible_items(
    items: impl IntoIterator<Item = BallotItem>,
    voter_faculty: Option<&Faculty>,
    now: OffsetDateTime,
    default: DefaultEligibility,
) -> Vec<ItemWithStatus> {
    let mut visible = items
        .into_iter()
        .filter(|item| is_eligible(voter_faculty, &item.scope, default))
        .map(|item| ItemWithStatus::new(item, now))
        .filter(|entry| entry.computed_status != Status::Draft)
        .collect::<Vec<_>>();

    visible.sort_by(|a, b| {
        status_rank(a.computed_status)
            .cmp(&status_rank(b.computed_status))
            .then(a.item.start_time.cmp(&b.item.start_time))
    });

    visible
}

/// Sorts selections for display: by explicit `order` (missing counts as 0),
/// ties in creation order. Expects `selections` in creation order.
pub fn display_order(mut selections: Vec<Selection>) -> Vec<Selection> {
    selections.sort_by_key(|selection| selection.order.unwrap_or_default());
    selections
}
