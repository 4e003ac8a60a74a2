//! A [`Store`] kept entirely in memory, for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use types_rs::univote::{BallotItem, BallotRecord, ItemKind, Selection, Voter};
use uuid::Uuid;

use crate::{
    auth::Credential,
    store::{BallotStats, DeleteOutcome, InsertOutcome, Result, Store},
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    voters: Vec<(Voter, Credential)>,
    items: Vec<BallotItem>,
    /// In creation order.
    selections: Vec<Selection>,
    ballots: HashMap<String, BallotRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_voter(&self, voter: &Voter, credential: &Credential) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner
            .voters
            .iter()
            .any(|(existing, _)| existing.university_id == voter.university_id)
        {
            return Ok(false);
        }
        inner.voters.push((voter.clone(), credential.clone()));
        Ok(true)
    }

    async fn get_voter(&self, id: Uuid) -> Result<Option<Voter>> {
        let inner = self.inner.read().await;
        Ok(inner
            .voters
            .iter()
            .find(|(voter, _)| voter.id == id)
            .map(|(voter, _)| voter.clone()))
    }

    async fn find_credentials(&self, university_id: &str) -> Result<Option<(Voter, Credential)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .voters
            .iter()
            .find(|(voter, _)| voter.university_id == university_id)
            .cloned())
    }

    async fn list_voters(&self) -> Result<Vec<Voter>> {
        let inner = self.inner.read().await;
        Ok(inner.voters.iter().map(|(voter, _)| voter.clone()).collect())
    }

    async fn update_voter(&self, voter: &Voter) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.voters.iter_mut().find(|(existing, _)| existing.id == voter.id) {
            Some((existing, _)) => {
                existing.name = voter.name.clone();
                existing.faculty = voter.faculty.clone();
                existing.role = voter.role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_voter_active(&self, id: Uuid, is_active: bool) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.voters.iter_mut().find(|(voter, _)| voter.id == id) {
            Some((voter, _)) => {
                voter.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_item(&self, item: &BallotItem, selections: &[Selection]) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.items.push(item.clone());
        inner.selections.extend_from_slice(selections);
        Ok(())
    }

    async fn get_item(&self, kind: ItemKind, id: Uuid) -> Result<Option<BallotItem>> {
        let inner = self.inner.read().await;
        Ok(inner
            .items
            .iter()
            .find(|item| item.id == id && item.kind == kind)
            .cloned())
    }

    async fn list_items(&self, kind: ItemKind) -> Result<Vec<BallotItem>> {
        let inner = self.inner.read().await;
        Ok(inner
            .items
            .iter()
            .filter(|item| item.kind == kind)
            .cloned()
            .collect())
    }

    async fn update_item(&self, item: &BallotItem) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner
            .items
            .iter_mut()
            .find(|existing| existing.id == item.id && existing.kind == item.kind)
        {
            Some(existing) => {
                *existing = BallotItem {
                    created_at: existing.created_at,
                    ..item.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_item(&self, kind: ItemKind, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.items.len();
        inner.items.retain(|item| !(item.id == id && item.kind == kind));
        if inner.items.len() == before {
            return Ok(false);
        }
        inner.selections.retain(|selection| selection.item_id != id);
        inner.ballots.retain(|_, ballot| ballot.item_id != id);
        Ok(true)
    }

    async fn create_selection(&self, selection: &Selection) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.items.iter().any(|item| item.id == selection.item_id) {
            return Ok(false);
        }
        inner.selections.push(selection.clone());
        Ok(true)
    }

    async fn list_selections(&self, item_id: Uuid) -> Result<Vec<Selection>> {
        let inner = self.inner.read().await;
        Ok(inner
            .selections
            .iter()
            .filter(|selection| selection.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn delete_selection(&self, id: Uuid) -> Result<DeleteOutcome> {
        let mut inner = self.inner.write().await;
        if !inner.selections.iter().any(|selection| selection.id == id) {
            return Ok(DeleteOutcome::NotFound);
        }
        if inner
            .ballots
            .values()
            .any(|ballot| ballot.selection_id == id)
        {
            return Ok(DeleteOutcome::InUse);
        }
        inner.selections.retain(|selection| selection.id != id);
        Ok(DeleteOutcome::Deleted)
    }

    async fn insert_ballot_if_absent(&self, ballot: &BallotRecord) -> Result<InsertOutcome> {
        // one write lock covers the membership check and the insert
        let mut inner = self.inner.write().await;

        if !inner
            .selections
            .iter()
            .any(|selection| selection.id == ballot.selection_id && selection.item_id == ballot.item_id)
        {
            return Ok(InsertOutcome::UnknownSelection);
        }

        if inner.ballots.contains_key(&ballot.key) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        inner.ballots.insert(ballot.key.clone(), ballot.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_ballot(
        &self,
        kind: ItemKind,
        voter_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<BallotRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ballots
            .get(&BallotRecord::key(kind, voter_id, item_id))
            .cloned())
    }

    async fn list_ballots(&self, item_id: Uuid) -> Result<Vec<BallotRecord>> {
        let inner = self.inner.read().await;
        let mut ballots = inner
            .ballots
            .values()
            .filter(|ballot| ballot.item_id == item_id)
            .cloned()
            .collect::<Vec<_>>();
        ballots.sort_by_key(|ballot| ballot.cast_at);
        Ok(ballots)
    }

    async fn ballot_stats(&self) -> Result<BallotStats> {
        let inner = self.inner.read().await;
        let mut voters = inner
            .ballots
            .values()
            .map(|ballot| ballot.voter_id)
            .collect::<Vec<_>>();
        voters.sort_unstable();
        voters.dedup();
        Ok(BallotStats {
            total_ballots: inner.ballots.len() as u64,
            distinct_voters: voters.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use time::macros::datetime;
    use types_rs::univote::{Scope, Status};

    use super::*;

    fn item(kind: ItemKind) -> BallotItem {
        BallotItem {
            id: Uuid::new_v4(),
            kind,
            title: "Budget".to_owned(),
            description: String::new(),
            scope: Scope::all_faculties(),
            start_time: datetime!(2025-01-01 0:00 UTC),
            end_time: datetime!(2025-01-10 0:00 UTC),
            status: Status::Scheduled,
            created_at: datetime!(2024-12-01 0:00 UTC),
        }
    }

    fn selection(item_id: Uuid, name: &str) -> Selection {
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

    fn ballot(item: &BallotItem, selection_id: Uuid, voter_id: Uuid) -> BallotRecord {
        BallotRecord {
            key: BallotRecord::key(item.kind, voter_id, item.id),
            kind: item.kind,
            voter_id,
            item_id: item.id,
            selection_id,
            voter_faculty: None,
            cast_at: datetime!(2025-01-02 0:00 UTC),
        }
    }

    #[tokio::test]
    async fn test_items_are_separated_by_kind() {
        let store = MemoryStore::new();
        let poll = item(ItemKind::Poll);
        store.create_item(&poll, &[]).await.unwrap();

        assert_eq!(store.get_item(ItemKind::Poll, poll.id).await.unwrap(), Some(poll.clone()));
        assert_eq!(store.get_item(ItemKind::Election, poll.id).await.unwrap(), None);
        assert!(store.list_items(ItemKind::Election).await.unwrap().is_empty());
        assert!(!store.delete_item(ItemKind::Election, poll.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_conditional_insert() {
        let store = MemoryStore::new();
        let election = item(ItemKind::Election);
        let a = selection(election.id, "A");
        let b = selection(election.id, "B");
        store
            .create_item(&election, &[a.clone(), b.clone()])
            .await
            .unwrap();

        let voter_id = Uuid::new_v4();
        assert_eq!(
            store
                .insert_ballot_if_absent(&ballot(&election, a.id, voter_id))
                .await
                .unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store
                .insert_ballot_if_absent(&ballot(&election, b.id, voter_id))
                .await
                .unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(
            store
                .insert_ballot_if_absent(&ballot(&election, Uuid::new_v4(), Uuid::new_v4()))
                .await
                .unwrap(),
            InsertOutcome::UnknownSelection
        );

        let ballots = store.list_ballots(election.id).await.unwrap();
        assert_eq!(ballots.len(), 1);
        assert_eq!(ballots[0].selection_id, a.id);
    }

    #[tokio::test]
    async fn test_selection_of_another_item_is_rejected() {
        let store = MemoryStore::new();
        let first = item(ItemKind::Poll);
        let second = item(ItemKind::Poll);
        let foreign = selection(second.id, "Yes");
        store.create_item(&first, &[]).await.unwrap();
        store.create_item(&second, &[foreign.clone()]).await.unwrap();

        assert_eq!(
            store
                .insert_ballot_if_absent(&ballot(&first, foreign.id, Uuid::new_v4()))
                .await
                .unwrap(),
            InsertOutcome::UnknownSelection
        );
    }

    #[tokio::test]
    async fn test_voted_selection_cannot_be_deleted() {
        let store = MemoryStore::new();
        let poll = item(ItemKind::Poll);
        let yes = selection(poll.id, "Yes");
        let no = selection(poll.id, "No");
        store.create_item(&poll, &[yes.clone(), no.clone()]).await.unwrap();
        store
            .insert_ballot_if_absent(&ballot(&poll, yes.id, Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(store.delete_selection(yes.id).await.unwrap(), DeleteOutcome::InUse);
        assert_eq!(store.delete_selection(no.id).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.delete_selection(no.id).await.unwrap(), DeleteOutcome::NotFound);
        assert_eq!(
            store
                .list_selections(poll.id)
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.name)
                .collect::<Vec<_>>(),
            vec!["Yes".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_delete_item_cascades() {
        let store = MemoryStore::new();
        let poll = item(ItemKind::Poll);
        let yes = selection(poll.id, "Yes");
        store.create_item(&poll, &[yes.clone()]).await.unwrap();
        let voter_id = Uuid::new_v4();
        store
            .insert_ballot_if_absent(&ballot(&poll, yes.id, voter_id))
            .await
            .unwrap();

        assert!(store.delete_item(ItemKind::Poll, poll.id).await.unwrap());
        assert!(store.list_selections(poll.id).await.unwrap().is_empty());
        assert_eq!(
            store.get_ballot(ItemKind::Poll, voter_id, poll.id).await.unwrap(),
            None
        );
        assert_eq!(store.ballot_stats().await.unwrap(), BallotStats::default());
    }
}
