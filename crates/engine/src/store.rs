//! Append-only store of encrypted bids, indexed by bidder identity.

use auction_types::{BidderId, EncU64, UNREGISTERED};
use borsh::{BorshDeserialize, BorshSerialize};

use crate::error::EngineError;

/// One bidder's encrypted bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StoredBid {
    pub price: EncU64,
    pub quantity: EncU64,
    /// The bidder's identity, encrypted, so it can be carried through selections
    pub identity: EncU64,
}

/// Bids by identity. Identity `k` lives at index `k - 1`; slots are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BidStore {
    bids: Vec<StoredBid>,
}

impl BidStore {
    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    /// All bids in identity order.
    pub fn bids(&self) -> &[StoredBid] {
        &self.bids
    }

    /// Get a bid by identity.
    pub fn get(&self, id: BidderId) -> Option<&StoredBid> {
        if id == UNREGISTERED {
            return None;
        }
        self.bids.get(id as usize - 1)
    }

    /// Next identity the store will accept.
    pub fn next_identity(&self) -> BidderId {
        self.bids.len() as BidderId + 1
    }

    /// Check that `id` is the next identity without inserting anything.
    pub fn check_insert(&self, id: BidderId) -> Result<(), EngineError> {
        if id == UNREGISTERED {
            return Err(EngineError::InvalidBidder(id));
        }
        if (id as usize) <= self.bids.len() {
            return Err(EngineError::AlreadyBid(id));
        }
        if id != self.next_identity() {
            return Err(EngineError::InvalidBidder(id));
        }
        Ok(())
    }

    /// Append the bid of identity `id`, which must be the next identity.
    pub fn insert(&mut self, id: BidderId, bid: StoredBid) -> Result<(), EngineError> {
        self.check_insert(id)?;
        self.bids.push(bid);
        Ok(())
    }

    /// Overwrite price and quantity of the bid at `index`.
    pub(crate) fn rewrite(&mut self, index: usize, price: EncU64, quantity: EncU64) {
        if let Some(bid) = self.bids.get_mut(index) {
            bid.price = price;
            bid.quantity = quantity;
        }
    }
}
