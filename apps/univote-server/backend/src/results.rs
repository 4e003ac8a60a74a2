//! Tabulation over the store, and who gets to see it.

use time::OffsetDateTime;
use types_rs::univote::{is_eligible, tabulate, DefaultEligibility, ItemKind, Status, Tally, Voter};
use uuid::Uuid;

use crate::{error::Error, store::Store};

pub struct ResultAggregator<'a> {
    store: &'a dyn Store,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// The live tally of an item, whatever its status.
    pub async fn aggregate(&self, kind: ItemKind, item_id: Uuid) -> Result<Tally, Error> {
        if self.store.get_item(kind, item_id).await?.is_none() {
            return Err(Error::item_not_found(kind));
        }

        let selections = self.store.list_selections(item_id).await?;
        let ballots = self.store.list_ballots(item_id).await?;
        Ok(tabulate(item_id, &selections, &ballots))
    }

    /// The tally as a voter may see it: only once the item has closed, and
    /// only for items the voter could see in the listing.
    pub async fn voter_results(
        &self,
        voter: &Voter,
        kind: ItemKind,
        item_id: Uuid,
        default_eligibility: DefaultEligibility,
        now: OffsetDateTime,
    ) -> Result<Tally, Error> {
        let item = self
            .store
            .get_item(kind, item_id)
            .await?
            .ok_or_else(|| Error::item_not_found(kind))?;

        let status = item.effective_status(now);
        if status == Status::Draft
            || !is_eligible(voter.faculty.as_ref(), &item.scope, default_eligibility)
        {
            return Err(Error::item_not_found(kind));
        }

        if status != Status::Closed {
            return Err(Error::ResultsUnavailable(kind));
        }

        let selections = self.store.list_selections(item_id).await?;
        let ballots = self.store.list_ballots(item_id).await?;
        Ok(tabulate(item_id, &selections, &ballots))
    }
}
