//! Exactly-once vote casting.
//!
//! A voter's state for an item goes from "no vote" to "voted" and never back.
//! The early duplicate check only produces a friendlier rejection; the
//! guarantee itself comes from [`Store::insert_ballot_if_absent`], which is
//! keyed by [`BallotRecord::key`].

use time::OffsetDateTime;
use types_rs::univote::{is_eligible, BallotRecord, DefaultEligibility, ItemKind, Status, Voter};
use uuid::Uuid;

use crate::{
    error::Error,
    store::{InsertOutcome, Store},
};

pub struct VoteGuard<'a> {
    store: &'a dyn Store,
    default_eligibility: DefaultEligibility,
}

impl<'a> VoteGuard<'a> {
    pub fn new(store: &'a dyn Store, default_eligibility: DefaultEligibility) -> Self {
        Self {
            store,
            default_eligibility,
        }
    }

    /// Records `voter`'s vote for `selection_id` in the given item at `now`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyVoted`] if the voter already has a ballot for the item,
    ///   including when a concurrent request won the race.
    /// - [`Error::NotActive`] if the item is not active at `now`.
    /// - [`Error::NotEligible`] if the item's scope excludes the voter.
    /// - [`Error::NotFound`] for an unknown or unpublished item, or a
    ///   selection that does not belong to it.
    /// - [`Error::Transient`] if the store fails. Nothing was recorded and the
    ///   request may be retried.
    pub async fn cast_vote(
        &self,
        voter: &Voter,
        kind: ItemKind,
        item_id: Uuid,
        selection_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<BallotRecord, Error> {
        if !voter.is_active {
            return Err(Error::Forbidden(
                "This account has been deactivated".to_owned(),
            ));
        }

        if self
            .store
            .get_ballot(kind, voter.id, item_id)
            .await?
            .is_some()
        {
            return Err(Error::AlreadyVoted(kind));
        }

        let item = self
            .store
            .get_item(kind, item_id)
            .await?
            .ok_or_else(|| Error::item_not_found(kind))?;

        match item.effective_status(now) {
            Status::Active => {}
            Status::Draft => return Err(Error::item_not_found(kind)),
            status => return Err(Error::NotActive { kind, status }),
        }

        if !is_eligible(voter.faculty.as_ref(), &item.scope, self.default_eligibility) {
            return Err(Error::NotEligible(kind));
        }

        let ballot = BallotRecord::new(kind, voter, item_id, selection_id, now);
        match self.store.insert_ballot_if_absent(&ballot).await? {
            InsertOutcome::Inserted => {
                tracing::info!(
                    voter_id = %voter.id,
                    item_id = %item_id,
                    "{kind} ballot recorded"
                );
                Ok(ballot)
            }
            InsertOutcome::AlreadyExists => Err(Error::AlreadyVoted(kind)),
            InsertOutcome::UnknownSelection => Err(Error::selection_not_found(kind)),
        }
    }

    /// Whether `voter_id` has a ballot for the item. Has no side effects.
    pub async fn has_voted(
        &self,
        kind: ItemKind,
        voter_id: Uuid,
        item_id: Uuid,
    ) -> Result<bool, Error> {
        Ok(self
            .store
            .get_ballot(kind, voter_id, item_id)
            .await?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use time::macros::datetime;
    use types_rs::univote::{BallotItem, ErrorCode, Faculty, Role, Scope, Selection};

    use super::*;
    use crate::{
        memory::MemoryStore,
        results::ResultAggregator,
        store::{MockStore, StoreError},
    };

    const NOW: OffsetDateTime = datetime!(2025-01-05 0:00 UTC);

    fn voter(faculty: Option<&str>) -> Voter {
        Voter {
            id: Uuid::new_v4(),
            university_id: "ENG001".to_owned(),
            name: "Ada".to_owned(),
            faculty: faculty.map(|name| Faculty::try_from(name).unwrap()),
            role: Role::Voter,
            is_active: true,
            created_at: datetime!(2024-09-01 0:00 UTC),
        }
    }

    fn election(scope: Scope) -> BallotItem {
        BallotItem {
            id: Uuid::new_v4(),
            kind: ItemKind::Election,
            title: "Faculty Representative".to_owned(),
            description: String::new(),
            scope,
            start_time: datetime!(2025-01-01 0:00 UTC),
            end_time: datetime!(2025-01-10 0:00 UTC),
            status: Status::Scheduled,
            created_at: datetime!(2024-12-01 0:00 UTC),
        }
    }

    fn candidate(item_id: Uuid, name: &str) -> Selection {
        Selection {
            id: Uuid::new_v4(),
            item_id,
            name: name.to_owned(),
            faculty: None,
            bio: None,
            photo_url: None,
            order: None,
            created_at: datetime!(2024-12-01 0:00 UTC),
        }
    }

    async fn seeded(scope: Scope) -> (MemoryStore, BallotItem, Selection, Selection) {
        let store = MemoryStore::new();
        let item = election(scope);
        let a = candidate(item.id, "A");
        let b = candidate(item.id, "B");
        store
            .create_item(&item, &[a.clone(), b.clone()])
            .await
            .unwrap();
        (store, item, a, b)
    }

    #[tokio::test]
    async fn test_second_vote_is_rejected() {
        let (store, item, a, b) = seeded(Scope::all_faculties()).await;
        let guard = VoteGuard::new(&store, DefaultEligibility::Allow);
        let voter = voter(Some("Engineering"));

        let ballot = guard
            .cast_vote(&voter, ItemKind::Election, item.id, a.id, NOW)
            .await
            .unwrap();
        assert_eq!(ballot.selection_id, a.id);
        assert_eq!(ballot.voter_faculty, voter.faculty);

        let error = guard
            .cast_vote(&voter, ItemKind::Election, item.id, b.id, NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::AlreadyVoted);

        let tally = ResultAggregator::new(&store)
            .aggregate(ItemKind::Election, item.id)
            .await
            .unwrap();
        assert_eq!(tally.total_votes, 1);
        assert_eq!(
            tally
                .results
                .iter()
                .map(|entry| (entry.name.as_str(), entry.votes))
                .collect::<Vec<_>>(),
            vec![("A", 1), ("B", 0)]
        );
    }

    #[tokio::test]
    async fn test_not_active() {
        let (store, item, a, _) = seeded(Scope::all_faculties()).await;
        let guard = VoteGuard::new(&store, DefaultEligibility::Allow);

        for (now, status) in [
            (datetime!(2024-12-31 23:59:59 UTC), Status::Scheduled),
            (datetime!(2025-01-10 0:00:01 UTC), Status::Closed),
        ] {
            let error = guard
                .cast_vote(&voter(None), ItemKind::Election, item.id, a.id, now)
                .await
                .unwrap_err();
            assert!(
                matches!(error, Error::NotActive { status: s, .. } if s == status),
                "unexpected error: {error:?}"
            );
        }

        // both boundaries admit votes
        for now in [item.start_time, item.end_time] {
            guard
                .cast_vote(&voter(None), ItemKind::Election, item.id, a.id, now)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_manual_close_and_draft() {
        let store = MemoryStore::new();
        let closed = BallotItem {
            status: Status::Closed,
            ..election(Scope::all_faculties())
        };
        let draft = BallotItem {
            status: Status::Draft,
            ..election(Scope::all_faculties())
        };
        let closed_candidate = candidate(closed.id, "A");
        let draft_candidate = candidate(draft.id, "A");
        store
            .create_item(&closed, &[closed_candidate.clone()])
            .await
            .unwrap();
        store
            .create_item(&draft, &[draft_candidate.clone()])
            .await
            .unwrap();

        let guard = VoteGuard::new(&store, DefaultEligibility::Allow);
        let error = guard
            .cast_vote(&voter(None), ItemKind::Election, closed.id, closed_candidate.id, NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::NotActive);

        let error = guard
            .cast_vote(&voter(None), ItemKind::Election, draft.id, draft_candidate.id, NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_eligibility() {
        let (store, item, a, _) =
            seeded(Scope::single(Faculty::try_from("Engineering").unwrap())).await;

        let error = VoteGuard::new(&store, DefaultEligibility::Allow)
            .cast_vote(&voter(Some("Medicine")), ItemKind::Election, item.id, a.id, NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::NotEligible);

        // no faculty: decided by the configured default
        let error = VoteGuard::new(&store, DefaultEligibility::Deny)
            .cast_vote(&voter(None), ItemKind::Election, item.id, a.id, NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::NotEligible);

        VoteGuard::new(&store, DefaultEligibility::Allow)
            .cast_vote(&voter(None), ItemKind::Election, item.id, a.id, NOW)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_item_and_selection() {
        let (store, item, _, _) = seeded(Scope::all_faculties()).await;
        let guard = VoteGuard::new(&store, DefaultEligibility::Allow);
        let voter = voter(None);

        let error = guard
            .cast_vote(&voter, ItemKind::Election, Uuid::new_v4(), Uuid::new_v4(), NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::NotFound);

        // same id, wrong kind
        let error = guard
            .cast_vote(&voter, ItemKind::Poll, item.id, Uuid::new_v4(), NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::NotFound);

        let error = guard
            .cast_vote(&voter, ItemKind::Election, item.id, Uuid::new_v4(), NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::NotFound);
        assert!(!guard
            .has_voted(ItemKind::Election, voter.id, item.id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_inactive_voter() {
        let (store, item, a, _) = seeded(Scope::all_faculties()).await;
        let voter = Voter {
            is_active: false,
            ..voter(None)
        };
        let error = VoteGuard::new(&store, DefaultEligibility::Allow)
            .cast_vote(&voter, ItemKind::Election, item.id, a.id, NOW)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_has_voted_is_idempotent() {
        let (store, item, a, _) = seeded(Scope::all_faculties()).await;
        let guard = VoteGuard::new(&store, DefaultEligibility::Allow);
        let voter = voter(None);

        for _ in 0..3 {
            assert!(!guard
                .has_voted(ItemKind::Election, voter.id, item.id)
                .await
                .unwrap());
        }

        guard
            .cast_vote(&voter, ItemKind::Election, item.id, a.id, NOW)
            .await
            .unwrap();

        for _ in 0..3 {
            assert!(guard
                .has_voted(ItemKind::Election, voter.id, item.id)
                .await
                .unwrap());
        }
        assert_eq!(store.list_ballots(item.id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_casts_record_exactly_one_ballot() {
        const ATTEMPTS: usize = 32;

        let (store, item, a, b) = seeded(Scope::all_faculties()).await;
        let store = Arc::new(store);
        let voter = voter(Some("Engineering"));

        let tasks = (0..ATTEMPTS)
            .map(|n| {
                let store = store.clone();
                let voter = voter.clone();
                let selection_id = if n % 2 == 0 { a.id } else { b.id };
                tokio::spawn(async move {
                    VoteGuard::new(store.as_ref(), DefaultEligibility::Allow)
                        .cast_vote(&voter, ItemKind::Election, item.id, selection_id, NOW)
                        .await
                })
            })
            .collect::<Vec<_>>();

        let mut accepted = 0;
        let mut duplicates = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(Error::AlreadyVoted(_)) => duplicates += 1,
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(duplicates, ATTEMPTS - 1);
        assert_eq!(store.list_ballots(item.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_transient() {
        let item = election(Scope::all_faculties());
        let item_id = item.id;

        let mut store = MockStore::new();
        store.expect_get_ballot().returning(|_, _, _| Ok(None));
        store
            .expect_get_item()
            .returning(move |_, _| Ok(Some(item.clone())));
        store
            .expect_insert_ballot_if_absent()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("connection reset".to_owned())));

        let error = VoteGuard::new(&store, DefaultEligibility::Allow)
            .cast_vote(&voter(None), ItemKind::Election, item_id, Uuid::new_v4(), NOW)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorCode::Transient);
        assert!(error.kind().is_retryable());
    }

    #[tokio::test]
    async fn test_failed_duplicate_check_is_not_reported_as_duplicate() {
        let mut store = MockStore::new();
        store
            .expect_get_ballot()
            .returning(|_, _, _| Err(StoreError::Unavailable("pool timed out".to_owned())));
        store.expect_insert_ballot_if_absent().never();

        let error = VoteGuard::new(&store, DefaultEligibility::Allow)
            .cast_vote(
                &voter(None),
                ItemKind::Poll,
                Uuid::new_v4(),
                Uuid::new_v4(),
                NOW,
            )
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorCode::Transient);
    }
}
