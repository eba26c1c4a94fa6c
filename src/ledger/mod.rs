use serde::{Deserialize, Serialize};

use crate::error::ProgramError;
use crate::pubkey::Pubkey;
use crate::settlement::{FeeRate, Lamports, TransferPlan};

/// Primary-sale terms, remaining supply and the ownership roster.
///
/// `owners` holds one entry per unit held, so a holder of two units appears
/// twice. Entries are appended by primary purchases and reassigned in place
/// by secondary purchases; the roster never shrinks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ledger {
    pub boss: Pubkey,
    pub original_supply_remaining: u64,
    pub price: Lamports,
    pub resale_fee: FeeRate,
    pub owners: Vec<Pubkey>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerPhase {
    Active,
    SoldOut,
}

impl Ledger {
    pub fn phase(&self) -> LedgerPhase {
        if self.original_supply_remaining == 0 {
            LedgerPhase::SoldOut
        } else {
            LedgerPhase::Active
        }
    }

    pub fn is_owner(&self, who: &Pubkey) -> bool {
        self.owners.contains(who)
    }

    /// Units held by `who`.
    pub fn holdings(&self, who: &Pubkey) -> usize {
        self.owners.iter().filter(|o| *o == who).count()
    }

    /// Replaces the first roster entry equal to `from` with `to` and
    /// returns its index.
    pub(crate) fn reassign_unit(
        &mut self,
        from: &Pubkey,
        to: Pubkey,
    ) -> Result<usize, ProgramError> {
        let idx = self
            .owners
            .iter()
            .position(|o| o == from)
            .ok_or(ProgramError::NotOwner)?;
        self.owners[idx] = to;
        Ok(idx)
    }
}

/// New ledger state plus the payment for one primary unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimarySale {
    pub ledger: Ledger,
    pub plan: TransferPlan,
}

pub fn create_ledger(caller: Pubkey, supply: u64, price: Lamports, resale_fee: FeeRate) -> Ledger {
    Ledger {
        boss: caller,
        original_supply_remaining: supply,
        price,
        resale_fee,
        owners: Vec::new(),
    }
}

pub fn purchase_primary(
    ledger: &Ledger,
    buyer: &Pubkey,
    boss: &Pubkey,
) -> Result<PrimarySale, ProgramError> {
    if ledger.original_supply_remaining == 0 {
        return Err(ProgramError::SoldOut);
    }
    if boss != &ledger.boss {
        return Err(ProgramError::InvalidBoss);
    }

    let mut next = ledger.clone();
    next.original_supply_remaining -= 1;
    next.owners.push(*buyer);

    let mut plan = TransferPlan::new();
    plan.push(*buyer, ledger.boss, ledger.price, "primary purchase");
    Ok(PrimarySale { ledger: next, plan })
}
