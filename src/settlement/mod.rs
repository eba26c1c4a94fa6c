use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProgramError;
use crate::pubkey::Pubkey;

pub type Lamports = u64;

pub const LAMPORTS_PER_SOL: Lamports = 1_000_000_000;
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Resale fee fraction held as basis points, so 0.10 is 1_000 bps.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(try_from = "u16", into = "u16")]
pub struct FeeRate {
    bps: u16,
}

impl FeeRate {
    pub fn from_bps(bps: u16) -> Result<Self, ProgramError> {
        if bps > BPS_DENOMINATOR {
            return Err(ProgramError::InvalidResaleFee);
        }
        Ok(Self { bps })
    }

    pub fn bps(&self) -> u16 {
        self.bps
    }

    /// Floor of `price * rate`; the remainder goes to the seller.
    pub fn split(&self, price: Lamports) -> ResaleSplit {
        let fee = (price as u128 * self.bps as u128 / BPS_DENOMINATOR as u128) as Lamports;
        ResaleSplit {
            fee,
            seller_proceeds: price - fee,
        }
    }
}

impl TryFrom<u16> for FeeRate {
    type Error = ProgramError;

    fn try_from(bps: u16) -> Result<Self, Self::Error> {
        Self::from_bps(bps)
    }
}

impl From<FeeRate> for u16 {
    fn from(rate: FeeRate) -> Self {
        rate.bps
    }
}

impl FromStr for FeeRate {
    type Err = ProgramError;

    /// Accepts a fraction (`0.10`) or a percentage (`10%`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bps = match s.strip_suffix('%') {
            Some(pct) => parse_decimal(pct.trim(), 2),
            None => parse_decimal(s, 4),
        }
        .ok_or(ProgramError::InvalidResaleFee)?;
        let bps = u16::try_from(bps).map_err(|_| ProgramError::InvalidResaleFee)?;
        Self::from_bps(bps)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResaleSplit {
    pub fee: Lamports,
    pub seller_proceeds: Lamports,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    pub from: Pubkey,
    pub to: Pubkey,
    pub amount: Lamports,
    pub memo: Option<String>,
}

/// Value movements a successful handler asks the runtime to apply.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TransferPlan {
    pub transfers: Vec<Transfer>,
}

impl TransferPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-amount legs are dropped; a 0% fee produces no boss transfer.
    pub fn push(&mut self, from: Pubkey, to: Pubkey, amount: Lamports, memo: impl Into<String>) {
        if amount == 0 {
            return;
        }
        self.transfers.push(Transfer {
            from,
            to,
            amount,
            memo: Some(memo.into()),
        });
    }

    pub fn total_amount(&self) -> Lamports {
        self.transfers.iter().map(|t| t.amount).sum()
    }

    pub fn total_from(&self, payer: &Pubkey) -> Lamports {
        self.transfers
            .iter()
            .filter(|t| &t.from == payer)
            .map(|t| t.amount)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

/// Parses an unsigned decimal into an integer scaled by `10^scale`
/// without going through floating point. Excess fractional digits are
/// rejected rather than rounded.
pub fn parse_decimal(s: &str, scale: u32) -> Option<u64> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
        || frac_part.len() > scale as usize
    {
        return None;
    }
    let factor = 10u64.checked_pow(scale)?;
    let int_value = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<u64>().ok()?
    };
    let mut frac_value = 0u64;
    if !frac_part.is_empty() {
        frac_value = frac_part.parse::<u64>().ok()?;
        frac_value = frac_value.checked_mul(10u64.pow(scale - frac_part.len() as u32))?;
    }
    int_value.checked_mul(factor)?.checked_add(frac_value)
}

/// `"0.25"` -> 250_000_000 lamports.
pub fn parse_sol(s: &str) -> Option<Lamports> {
    parse_decimal(s.trim(), 9)
}
