use serde::{Deserialize, Serialize};

use crate::error::ProgramError;
use crate::ledger::Ledger;
use crate::pubkey::Pubkey;
use crate::settlement::{Lamports, ResaleSplit, TransferPlan};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscrowItem {
    pub price: Lamports,
    pub seller: Pubkey,
}

/// Active resale listings for one ledger.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Escrow {
    pub boss: Pubkey,
    pub ledger: Pubkey,
    pub items: Vec<EscrowItem>,
}

impl Escrow {
    pub fn position(&self, wanted: &EscrowItem) -> Option<usize> {
        self.items.iter().position(|item| item == wanted)
    }

    pub fn listings_by<'a>(&'a self, seller: &'a Pubkey) -> impl Iterator<Item = &'a EscrowItem> {
        self.items.iter().filter(move |item| &item.seller == seller)
    }
}

/// Escrow and ledger after a settled resale, with the fee split applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondarySale {
    pub escrow: Escrow,
    pub ledger: Ledger,
    pub split: ResaleSplit,
    pub plan: TransferPlan,
}

/// Accounts named by a secondary purchase besides the two records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecondaryParties<'a> {
    pub buyer: &'a Pubkey,
    pub seller: &'a Pubkey,
    pub boss: &'a Pubkey,
}

/// The escrow boss is copied from the ledger, never from the caller.
pub fn create_escrow(ledger_address: Pubkey, ledger: &Ledger) -> Escrow {
    Escrow {
        boss: ledger.boss,
        ledger: ledger_address,
        items: Vec::new(),
    }
}

pub fn submit_listing(
    escrow: &Escrow,
    ledger: &Ledger,
    seller: &Pubkey,
    price: Lamports,
) -> Result<Escrow, ProgramError> {
    if !ledger.is_owner(seller) {
        return Err(ProgramError::NotOwner);
    }
    let mut next = escrow.clone();
    next.items.push(EscrowItem {
        price,
        seller: *seller,
    });
    Ok(next)
}

pub fn purchase_secondary(
    escrow: &Escrow,
    ledger: &Ledger,
    parties: SecondaryParties<'_>,
    wanted: &EscrowItem,
) -> Result<SecondarySale, ProgramError> {
    // a wrong price is reported the same way as no listing at all
    let idx = escrow.position(wanted).ok_or(ProgramError::ListingMismatch)?;
    if parties.seller != &wanted.seller {
        return Err(ProgramError::SellerIdentityMismatch);
    }
    if parties.boss != &ledger.boss {
        return Err(ProgramError::InvalidBoss);
    }

    let mut next_ledger = ledger.clone();
    next_ledger.reassign_unit(&wanted.seller, *parties.buyer)?;

    let mut next_escrow = escrow.clone();
    next_escrow.items.remove(idx);

    let split = ledger.resale_fee.split(wanted.price);
    let mut plan = TransferPlan::new();
    plan.push(*parties.buyer, ledger.boss, split.fee, "resale fee");
    plan.push(
        *parties.buyer,
        wanted.seller,
        split.seller_proceeds,
        "resale proceeds",
    );

    Ok(SecondarySale {
        escrow: next_escrow,
        ledger: next_ledger,
        split,
        plan,
    })
}
