//! Primary/secondary sale ledger for a fixed-supply tokenized asset.
//!
//! The crate is split into the core state machine and the host around it:
//!
//! * [`ledger`]: primary sale: fixed supply, fixed price, single boss, and
//!   the ownership roster.
//! * [`escrow`]: owner-gated resale listings and price-matched secondary
//!   purchases.
//! * [`settlement`]: integer currency, basis-point fee rates and the
//!   transfer plans handlers hand back to the host.
//! * [`runtime`]: in-process host that authenticates signed invocations and
//!   commits handler output atomically.
//! * [`store`]: JSON state file and keypair files used by the `somos` CLI.
//!
//! Handlers never touch balances or storage; they take the records they need
//! and return the next state plus the transfers to apply.

pub mod escrow;
pub mod instruction;
pub mod ledger;
pub mod pubkey;
pub mod runtime;
pub mod settlement;
pub mod store;

mod error;

pub use error::{ProgramError, ERROR_CODE_OFFSET};
