use thiserror::Error;

/// First custom error code; codes are stable and surfaced to callers.
pub const ERROR_CODE_OFFSET: u32 = 6000;

/// Failures raised by the transition handlers themselves.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProgramError {
    /// No primary supply remains.
    #[error("primary supply is sold out")]
    SoldOut,

    /// The boss account supplied does not match the ledger's boss.
    #[error("boss account does not match ledger boss")]
    InvalidBoss,

    /// The seller does not hold a unit in the owner roster.
    #[error("seller is not a current owner")]
    NotOwner,

    /// No listing exists for the requested seller and price.
    #[error("no escrow listing matches seller and price")]
    ListingMismatch,

    /// The seller account supplied differs from the listing's seller.
    #[error("seller account does not match listing seller")]
    SellerIdentityMismatch,

    /// Resale fee outside 0..=100%.
    #[error("resale fee must be between 0 and 1")]
    InvalidResaleFee,
}

impl ProgramError {
    pub fn code(&self) -> u32 {
        ERROR_CODE_OFFSET
            + match self {
                ProgramError::SoldOut => 0,
                ProgramError::InvalidBoss => 1,
                ProgramError::NotOwner => 2,
                ProgramError::ListingMismatch => 3,
                ProgramError::SellerIdentityMismatch => 4,
                ProgramError::InvalidResaleFee => 5,
            }
    }
}
