use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BallotRecord, Selection};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyEntry {
    pub selection_id: Uuid,
    pub name: String,
    pub votes: u64,
    /// Share of all ballots for the item, rounded to two decimals.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub item_id: Uuid,
    pub total_votes: u64,
    pub results: Vec<TallyEntry>,
}

/// Counts `ballots` per selection.
///
/// `selections` must be in creation order; selections with equal vote counts
/// keep that order in the output. Every selection appears, including those
/// without votes. Ballots for a selection that is not in the list still count
/// towards `total_votes`.
pub fn tabulate(item_id: Uuid, selections: &[Selection], ballots: &[BallotRecord]) -> Tally {
    let total_votes = ballots.len() as u64;

    let mut results = selections
        .iter()
        .map(|selection| {
            let votes = ballots
                .iter()
                .filter(|ballot| ballot.selection_id == selection.id)
                .count() as u64;
            TallyEntry {
                selection_id: selection.id,
                name: selection.name.clone(),
                votes,
                percentage: percentage(votes, total_votes),
            }
        })
        .collect::<Vec<_>>();

    // `sort_by` is stable, so ties stay in creation order
    results.sort_by(|a, b| b.votes.cmp(&a.votes));

    Tally {
        item_id,
        total_votes,
        results,
    }
}

fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let raw = votes as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use time::macros::datetime;

    use super::*;
    use crate::univote::ItemKind;

    fn selection(item_id: Uuid, name: &str) -> Selection {
        Selection {
            id: Uuid::new_v4(),
            item_id,
            name: name.to_owned(),
            faculty: None,
            bio: None,
            photo_url: None,
            order: None,
            created_at: datetime!(2025-01-01 0:00 UTC),
        }
    }

    fn ballot(item_id: Uuid, selection_id: Uuid) -> BallotRecord {
        let voter_id = Uuid::new_v4();
        BallotRecord {
            key: BallotRecord::key(ItemKind::Election, voter_id, item_id),
            kind: ItemKind::Election,
            voter_id,
            item_id,
            selection_id,
            voter_faculty: None,
            cast_at: datetime!(2025-01-02 0:00 UTC),
        }
    }

    #[test]
    fn test_three_way_tally() {
        let item_id = Uuid::new_v4();
        let x = selection(item_id, "X");
        let y = selection(item_id, "Y");
        let z = selection(item_id, "Z");

        let mut ballots = vec![];
        ballots.extend((0..3).map(|_| ballot(item_id, y.id)));
        ballots.extend((0..2).map(|_| ballot(item_id, x.id)));

        let tally = tabulate(item_id, &[x.clone(), y.clone(), z.clone()], &ballots);

        assert_eq!(tally.total_votes, 5);
        assert_eq!(
            tally.results,
            vec![
                TallyEntry {
                    selection_id: y.id,
                    name: "Y".to_owned(),
                    votes: 3,
                    percentage: 60.0,
                },
                TallyEntry {
                    selection_id: x.id,
                    name: "X".to_owned(),
                    votes: 2,
                    percentage: 40.0,
                },
                TallyEntry {
                    selection_id: z.id,
                    name: "Z".to_owned(),
                    votes: 0,
                    percentage: 0.0,
                },
            ]
        );
    }

    #[test]
    fn test_no_ballots() {
        let item_id = Uuid::new_v4();
        let selections = [selection(item_id, "A"), selection(item_id, "B")];
        let tally = tabulate(item_id, &selections, &[]);

        assert_eq!(tally.total_votes, 0);
        assert!(tally.results.iter().all(|entry| entry.percentage == 0.0));
        assert_eq!(
            tally
                .results
                .iter()
                .map(|entry| entry.name.as_str())
                .collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[test]
    fn test_rounding() {
        let item_id = Uuid::new_v4();
        let a = selection(item_id, "A");
        let b = selection(item_id, "B");
        let ballots = vec![
            ballot(item_id, a.id),
            ballot(item_id, b.id),
            ballot(item_id, b.id),
        ];

        let tally = tabulate(item_id, &[a, b], &ballots);
        assert_eq!(tally.results[0].percentage, 66.67);
        assert_eq!(tally.results[1].percentage, 33.33);
    }

    proptest! {
        #[test]
        fn prop_counts_are_conserved(
            selection_count in 1usize..8,
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..200),
        ) {
            let item_id = Uuid::new_v4();
            let selections = (0..selection_count)
                .map(|n| selection(item_id, &format!("S{n}")))
                .collect::<Vec<_>>();
            let ballots = picks
                .iter()
                .map(|pick| ballot(item_id, selections[pick.index(selection_count)].id))
                .collect::<Vec<_>>();

            let tally = tabulate(item_id, &selections, &ballots);

            prop_assert_eq!(tally.total_votes, ballots.len() as u64);
            prop_assert_eq!(tally.results.len(), selection_count);
            prop_assert_eq!(
                tally.results.iter().map(|entry| entry.votes).sum::<u64>(),
                tally.total_votes
            );

            if tally.total_votes > 0 {
                let sum = tally.results.iter().map(|entry| entry.percentage).sum::<f64>();
                // each entry rounds by at most 0.005
                let tolerance = 0.005 * selection_count as f64 + 1e-9;
                prop_assert!((sum - 100.0).abs() <= tolerance, "sum was {}", sum);
            }
        }

        #[test]
        fn prop_sorted_with_stable_ties(
            selection_count in 1usize..8,
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..60),
        ) {
            let item_id = Uuid::new_v4();
            let selections = (0..selection_count)
                .map(|n| selection(item_id, &format!("S{n}")))
                .collect::<Vec<_>>();
            let ballots = picks
                .iter()
                .map(|pick| ballot(item_id, selections[pick.index(selection_count)].id))
                .collect::<Vec<_>>();

            let tally = tabulate(item_id, &selections, &ballots);
            let position = |id: Uuid| selections.iter().position(|s| s.id == id).unwrap();

            for pair in tally.results.windows(2) {
                prop_assert!(pair[0].votes >= pair[1].votes);
                if pair[0].votes == pair[1].votes {
                    prop_assert!(position(pair[0].selection_id) < position(pair[1].selection_id));
                }
            }
        }
    }
}
