use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn};

use crate::error::ProgramError;
use crate::escrow::{create_escrow, purchase_secondary, submit_listing, Escrow, SecondaryParties};
use crate::instruction::{Instruction, SignatureError, SignedInvocation};
use crate::ledger::{create_ledger, purchase_primary, Ledger};
use crate::pubkey::{self, Pubkey};
use crate::settlement::{Lamports, Transfer, TransferPlan};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("invocation targets program {actual}, runtime hosts {expected}")]
    ProgramIdMismatch { expected: Pubkey, actual: Pubkey },
    #[error("account {0} must sign this instruction")]
    MissingSigner(Pubkey),
    #[error("invocation already processed")]
    DuplicateInvocation,
    #[error("account {0} is already in use")]
    AccountInUse(Pubkey),
    #[error("account {0} not found")]
    AccountNotFound(Pubkey),
    #[error("account {address} is not a {expected} record")]
    WrongRecordKind {
        address: Pubkey,
        expected: &'static str,
    },
    #[error("address {actual} is not derived from the supplied seed (expected {expected})")]
    SeedMismatch { expected: Pubkey, actual: Pubkey },
    #[error("escrow {escrow} does not belong to ledger {ledger}")]
    EscrowLedgerMismatch { escrow: Pubkey, ledger: Pubkey },
    #[error("insufficient funds in account {account}: need {needed}, have {available}")]
    InsufficientFunds {
        account: Pubkey,
        needed: Lamports,
        available: Lamports,
    },
    #[error("balance overflow in account {0}")]
    BalanceOverflow(Pubkey),
}

impl RuntimeError {
    /// Stable program error code, when the core rejected the invocation.
    pub fn code(&self) -> Option<u32> {
        match self {
            RuntimeError::Program(err) => Some(err.code()),
            _ => None,
        }
    }
}

/// Most recent events kept in [`Runtime::events`]; older ones are dropped.
pub const EVENT_HISTORY_LIMIT: usize = 256;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub program_id: Pubkey,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program_id: pubkey::derive_address(b"somos-ledger-program", &Pubkey::default()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Ledger(Ledger),
    Escrow(Escrow),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SlotMeta {
    pub slot: u64,
    pub previous_invocation: Option<[u8; 32]>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Airdrop {
        to: Pubkey,
        amount: Lamports,
    },
    Invocation {
        slot: u64,
        instruction: String,
        signer: Pubkey,
        transfers: Vec<Transfer>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub slot: u64,
    pub digest: [u8; 32],
    pub instruction: String,
    pub transfers: Vec<Transfer>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub program_id: Pubkey,
    pub meta: SlotMeta,
    pub balances: BTreeMap<Pubkey, Lamports>,
    pub records: BTreeMap<Pubkey, Record>,
    pub state_root: [u8; 32],
}

/// Record writes and transfers produced by one handler, not yet applied.
struct Staged {
    writes: Vec<(Pubkey, Record)>,
    plan: TransferPlan,
}

impl Staged {
    fn write(address: Pubkey, record: Record) -> Self {
        Self {
            writes: vec![(address, record)],
            plan: TransferPlan::new(),
        }
    }
}

/// In-process host that authenticates invocations, runs the handlers and
/// commits their effects atomically.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Runtime {
    config: RuntimeConfig,
    meta: SlotMeta,
    balances: BTreeMap<Pubkey, Lamports>,
    records: BTreeMap<Pubkey, Record>,
    events: Vec<RuntimeEvent>,
    applied: BTreeSet<[u8; 32]>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn program_id(&self) -> Pubkey {
        self.config.program_id
    }

    pub fn slot(&self) -> u64 {
        self.meta.slot
    }

    pub fn derive_address(&self, seed: &[u8]) -> Pubkey {
        pubkey::derive_address(seed, &self.config.program_id)
    }

    pub fn balance(&self, of: &Pubkey) -> Lamports {
        self.balances.get(of).copied().unwrap_or(0)
    }

    pub fn ledger(&self, address: &Pubkey) -> Option<&Ledger> {
        match self.records.get(address) {
            Some(Record::Ledger(ledger)) => Some(ledger),
            _ => None,
        }
    }

    pub fn escrow(&self, address: &Pubkey) -> Option<&Escrow> {
        match self.records.get(address) {
            Some(Record::Escrow(escrow)) => Some(escrow),
            _ => None,
        }
    }

    /// Recent airdrops and committed invocations, oldest first.
    pub fn events(&self) -> &[RuntimeEvent] {
        &self.events
    }

    fn record_event(&mut self, event: RuntimeEvent) {
        self.events.push(event);
        if self.events.len() > EVENT_HISTORY_LIMIT {
            let excess = self.events.len() - EVENT_HISTORY_LIMIT;
            self.events.drain(..excess);
        }
    }

    /// Funding utility for harnesses; mints lamports out of thin air.
    pub fn airdrop(&mut self, to: &Pubkey, amount: Lamports) -> Result<(), RuntimeError> {
        let balance = self.balances.entry(*to).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(RuntimeError::BalanceOverflow(*to))?;
        self.record_event(RuntimeEvent::Airdrop { to: *to, amount });
        debug!(%to, amount, "airdrop");
        Ok(())
    }

    pub fn execute(&mut self, signed: &SignedInvocation) -> Result<Receipt, RuntimeError> {
        let instruction = &signed.invocation.instruction;
        let span = info_span!("execute", instruction = instruction.name(), signer = %signed.signer);
        let _enter = span.enter();

        match self.try_execute(signed) {
            Ok(receipt) => {
                info!(
                    slot = receipt.slot,
                    transfers = receipt.transfers.len(),
                    "invocation committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                warn!(code = ?err.code(), error = %err, "invocation rejected");
                Err(err)
            }
        }
    }

    fn try_execute(&mut self, signed: &SignedInvocation) -> Result<Receipt, RuntimeError> {
        let invocation = &signed.invocation;
        if invocation.program_id != self.config.program_id {
            return Err(RuntimeError::ProgramIdMismatch {
                expected: self.config.program_id,
                actual: invocation.program_id,
            });
        }
        let digest = signed.verify()?;
        if self.applied.contains(&digest) {
            return Err(RuntimeError::DuplicateInvocation);
        }
        let instruction = &invocation.instruction;
        if &signed.signer != instruction.signer() {
            return Err(RuntimeError::MissingSigner(*instruction.signer()));
        }

        debug!(nonce = invocation.nonce, "dispatching");
        let staged = self.dispatch(instruction)?;
        let balances = self.stage_balances(&staged.plan)?;
        debug!(
            transfers = staged.plan.transfers.len(),
            total = staged.plan.total_amount(),
            "balances staged"
        );

        // everything below is infallible
        for (address, record) in staged.writes {
            self.records.insert(address, record);
        }
        self.balances.extend(balances);
        self.applied.insert(digest);
        self.meta.slot += 1;
        self.meta.previous_invocation = Some(digest);
        self.record_event(RuntimeEvent::Invocation {
            slot: self.meta.slot,
            instruction: instruction.name().to_string(),
            signer: signed.signer,
            transfers: staged.plan.transfers.clone(),
        });

        Ok(Receipt {
            slot: self.meta.slot,
            digest,
            instruction: instruction.name().to_string(),
            transfers: staged.plan.transfers,
        })
    }

    fn dispatch(&self, instruction: &Instruction) -> Result<Staged, RuntimeError> {
        match instruction {
            Instruction::InitializeLedger {
                user,
                ledger,
                seed,
                supply,
                price,
                resale_fee,
            } => {
                self.ensure_vacant(ledger, seed)?;
                let record = create_ledger(*user, *supply, *price, *resale_fee);
                Ok(Staged::write(*ledger, Record::Ledger(record)))
            }
            Instruction::PurchasePrimary { user, boss, ledger } => {
                let current = self.load_ledger(ledger)?;
                let sale = purchase_primary(current, user, boss)?;
                Ok(Staged {
                    writes: vec![(*ledger, Record::Ledger(sale.ledger))],
                    plan: sale.plan,
                })
            }
            Instruction::InitializeEscrow {
                user: _,
                escrow,
                ledger,
                seed,
            } => {
                self.ensure_vacant(escrow, seed)?;
                let current = self.load_ledger(ledger)?;
                let record = create_escrow(*ledger, current);
                Ok(Staged::write(*escrow, Record::Escrow(record)))
            }
            Instruction::SubmitToEscrow {
                seller,
                escrow,
                ledger,
                price,
            } => {
                let (current_escrow, current_ledger) = self.load_pair(escrow, ledger)?;
                let next = submit_listing(current_escrow, current_ledger, seller, *price)?;
                Ok(Staged::write(*escrow, Record::Escrow(next)))
            }
            Instruction::PurchaseSecondary {
                buyer,
                seller,
                boss,
                escrow,
                ledger,
                item,
            } => {
                let (current_escrow, current_ledger) = self.load_pair(escrow, ledger)?;
                let parties = SecondaryParties {
                    buyer,
                    seller,
                    boss,
                };
                let sale = purchase_secondary(current_escrow, current_ledger, parties, item)?;
                debug!(fee = sale.split.fee, proceeds = sale.split.seller_proceeds, "resale split");
                Ok(Staged {
                    writes: vec![
                        (*escrow, Record::Escrow(sale.escrow)),
                        (*ledger, Record::Ledger(sale.ledger)),
                    ],
                    plan: sale.plan,
                })
            }
        }
    }

    fn ensure_vacant(&self, address: &Pubkey, seed: &[u8]) -> Result<(), RuntimeError> {
        let expected = self.derive_address(seed);
        if &expected != address {
            return Err(RuntimeError::SeedMismatch {
                expected,
                actual: *address,
            });
        }
        if self.records.contains_key(address) {
            return Err(RuntimeError::AccountInUse(*address));
        }
        Ok(())
    }

    fn load_ledger(&self, address: &Pubkey) -> Result<&Ledger, RuntimeError> {
        match self.records.get(address) {
            Some(Record::Ledger(ledger)) => Ok(ledger),
            Some(_) => Err(RuntimeError::WrongRecordKind {
                address: *address,
                expected: "ledger",
            }),
            None => Err(RuntimeError::AccountNotFound(*address)),
        }
    }

    fn load_escrow(&self, address: &Pubkey) -> Result<&Escrow, RuntimeError> {
        match self.records.get(address) {
            Some(Record::Escrow(escrow)) => Ok(escrow),
            Some(_) => Err(RuntimeError::WrongRecordKind {
                address: *address,
                expected: "escrow",
            }),
            None => Err(RuntimeError::AccountNotFound(*address)),
        }
    }

    fn load_pair(
        &self,
        escrow: &Pubkey,
        ledger: &Pubkey,
    ) -> Result<(&Escrow, &Ledger), RuntimeError> {
        let current_escrow = self.load_escrow(escrow)?;
        if &current_escrow.ledger != ledger {
            return Err(RuntimeError::EscrowLedgerMismatch {
                escrow: *escrow,
                ledger: *ledger,
            });
        }
        Ok((current_escrow, self.load_ledger(ledger)?))
    }

    /// Post-transfer balances of every touched account, or the first
    /// transfer that cannot be funded.
    fn stage_balances(
        &self,
        plan: &TransferPlan,
    ) -> Result<BTreeMap<Pubkey, Lamports>, RuntimeError> {
        let mut touched: BTreeMap<Pubkey, Lamports> = BTreeMap::new();
        for transfer in &plan.transfers {
            let from = touched
                .entry(transfer.from)
                .or_insert_with(|| self.balance(&transfer.from));
            if *from < transfer.amount {
                return Err(RuntimeError::InsufficientFunds {
                    account: transfer.from,
                    needed: plan.total_from(&transfer.from),
                    available: self.balance(&transfer.from),
                });
            }
            *from -= transfer.amount;

            let to = touched
                .entry(transfer.to)
                .or_insert_with(|| self.balance(&transfer.to));
            *to = to
                .checked_add(transfer.amount)
                .ok_or(RuntimeError::BalanceOverflow(transfer.to))?;
        }
        Ok(touched)
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            program_id: self.config.program_id,
            meta: self.meta.clone(),
            balances: self.balances.clone(),
            records: self.records.clone(),
            state_root: compute_state_root(&self.balances, &self.records),
        }
    }
}

fn compute_state_root(
    balances: &BTreeMap<Pubkey, Lamports>,
    records: &BTreeMap<Pubkey, Record>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (account, lamports) in balances {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(account.as_bytes());
        hasher.update(lamports.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (address, record) in records {
        let mut hasher = Sha256::new();
        hasher.update(b"record");
        hasher.update(address.as_bytes());
        match record {
            Record::Ledger(ledger) => {
                hasher.update(b"ledger");
                hasher.update(ledger.boss.as_bytes());
                hasher.update(ledger.original_supply_remaining.to_le_bytes());
                hasher.update(ledger.price.to_le_bytes());
                hasher.update(ledger.resale_fee.bps().to_le_bytes());
                hasher.update((ledger.owners.len() as u64).to_le_bytes());
                for owner in &ledger.owners {
                    hasher.update(owner.as_bytes());
                }
            }
            Record::Escrow(escrow) => {
                hasher.update(b"escrow");
                hasher.update(escrow.boss.as_bytes());
                hasher.update(escrow.ledger.as_bytes());
                hasher.update((escrow.items.len() as u64).to_le_bytes());
                for item in &escrow.items {
                    hasher.update(item.seller.as_bytes());
                    hasher.update(item.price.to_le_bytes());
                }
            }
        }
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"somos-state-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
