use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use somos_ledger::{
    escrow::EscrowItem,
    instruction::{Instruction, Invocation, SignedInvocation},
    pubkey::Pubkey,
    runtime::{Receipt, Runtime, RuntimeConfig, RuntimeError, RuntimeEvent},
    settlement::{FeeRate, LAMPORTS_PER_SOL},
    ProgramError,
};

const LEDGER_SEED: &[u8] = b"hancockhancockha";
const ESCROW_SEED: &[u8] = b"grovergrovergrov";
const PRICE: u64 = LAMPORTS_PER_SOL / 10;
const LISTING_PRICE: u64 = LAMPORTS_PER_SOL / 4;

struct Chain {
    runtime: Runtime,
    nonce: u64,
    ledger: Pubkey,
    escrow: Pubkey,
}

impl Chain {
    fn new() -> Self {
        let runtime = Runtime::new(RuntimeConfig::default());
        let ledger = runtime.derive_address(LEDGER_SEED);
        let escrow = runtime.derive_address(ESCROW_SEED);
        Self {
            runtime,
            nonce: 0,
            ledger,
            escrow,
        }
    }

    fn create_user(&mut self) -> SigningKey {
        let sk = SigningKey::generate(&mut OsRng);
        self.runtime
            .airdrop(&Pubkey::from(&sk), 10 * LAMPORTS_PER_SOL)
            .unwrap();
        sk
    }

    fn send(&mut self, sk: &SigningKey, instruction: Instruction) -> Result<Receipt, RuntimeError> {
        self.nonce += 1;
        let invocation = Invocation {
            program_id: self.runtime.program_id(),
            nonce: self.nonce,
            instruction,
        };
        let signed = SignedInvocation::sign(sk, invocation).unwrap();
        self.runtime.execute(&signed)
    }

    fn initialize_ledger(&mut self, boss: &SigningKey, supply: u64) {
        let instruction = Instruction::InitializeLedger {
            user: Pubkey::from(boss),
            ledger: self.ledger,
            seed: LEDGER_SEED.to_vec(),
            supply,
            price: PRICE,
            resale_fee: "0.10".parse::<FeeRate>().unwrap(),
        };
        self.send(boss, instruction).unwrap();
    }

    fn initialize_escrow(&mut self, caller: &SigningKey) {
        let instruction = Instruction::InitializeEscrow {
            user: Pubkey::from(caller),
            escrow: self.escrow,
            ledger: self.ledger,
            seed: ESCROW_SEED.to_vec(),
        };
        self.send(caller, instruction).unwrap();
    }

    fn purchase_primary(
        &mut self,
        buyer: &SigningKey,
        boss: Pubkey,
    ) -> Result<Receipt, RuntimeError> {
        let instruction = Instruction::PurchasePrimary {
            user: Pubkey::from(buyer),
            boss,
            ledger: self.ledger,
        };
        self.send(buyer, instruction)
    }

    fn submit(&mut self, seller: &SigningKey, price: u64) -> Result<Receipt, RuntimeError> {
        let instruction = Instruction::SubmitToEscrow {
            seller: Pubkey::from(seller),
            escrow: self.escrow,
            ledger: self.ledger,
            price,
        };
        self.send(seller, instruction)
    }

    fn purchase_secondary(
        &mut self,
        buyer: &SigningKey,
        seller_account: Pubkey,
        boss: Pubkey,
        item: EscrowItem,
    ) -> Result<Receipt, RuntimeError> {
        let instruction = Instruction::PurchaseSecondary {
            buyer: Pubkey::from(buyer),
            seller: seller_account,
            boss,
            escrow: self.escrow,
            ledger: self.ledger,
            item,
        };
        self.send(buyer, instruction)
    }

    fn remaining(&self) -> u64 {
        self.runtime
            .ledger(&self.ledger)
            .unwrap()
            .original_supply_remaining
    }
}

fn program_error(result: Result<Receipt, RuntimeError>) -> ProgramError {
    match result {
        Err(RuntimeError::Program(err)) => err,
        other => panic!("expected program error, got {other:?}"),
    }
}

#[test]
fn primary_sale_counts_down_to_sold_out() {
    let mut chain = Chain::new();
    let boss = chain.create_user();
    let boss_pk = Pubkey::from(&boss);
    chain.initialize_ledger(&boss, 3);
    assert_eq!(chain.remaining(), 3);

    let first = chain.create_user();
    let before = chain.runtime.balance(&boss_pk);
    chain.purchase_primary(&first, boss_pk).unwrap();
    assert_eq!(chain.remaining(), 2);
    assert_eq!(chain.runtime.balance(&boss_pk) - before, 100_000_000);

    let second = chain.create_user();
    let before = chain.runtime.balance(&boss_pk);
    chain.purchase_primary(&second, boss_pk).unwrap();
    chain.purchase_primary(&second, boss_pk).unwrap();
    assert_eq!(chain.remaining(), 0);
    assert_eq!(chain.runtime.balance(&boss_pk) - before, 200_000_000);

    let late = chain.create_user();
    let snapshot = chain.runtime.snapshot();
    let events_before = chain.runtime.events().len();
    let err = chain.purchase_primary(&late, boss_pk);
    assert_eq!(program_error(err).code(), 6000);
    assert_eq!(chain.runtime.snapshot(), snapshot);
    assert_eq!(chain.runtime.events().len(), events_before);

    let owners = &chain.runtime.ledger(&chain.ledger).unwrap().owners;
    assert_eq!(
        owners,
        &vec![Pubkey::from(&first), Pubkey::from(&second), Pubkey::from(&second)]
    );
}

#[test]
fn primary_purchase_with_wrong_boss_fails() {
    let mut chain = Chain::new();
    let boss = chain.create_user();
    chain.initialize_ledger(&boss, 3);
    let buyer = chain.create_user();
    let buyer_pk = Pubkey::from(&buyer);

    let err = chain.purchase_primary(&buyer, buyer_pk);
    assert_eq!(program_error(err), ProgramError::InvalidBoss);
    assert_eq!(chain.runtime.balance(&buyer_pk), 10 * LAMPORTS_PER_SOL);
    assert_eq!(chain.remaining(), 3);
}

#[test]
fn resale_settles_fee_split_and_moves_one_unit() {
    let mut chain = Chain::new();
    let boss = chain.create_user();
    let boss_pk = Pubkey::from(&boss);
    chain.initialize_ledger(&boss, 3);

    let early = chain.create_user();
    let holder = chain.create_user();
    let holder_pk = Pubkey::from(&holder);
    chain.purchase_primary(&early, boss_pk).unwrap();
    chain.purchase_primary(&holder, boss_pk).unwrap();
    chain.purchase_primary(&holder, boss_pk).unwrap();

    chain.initialize_escrow(&boss);
    let escrow = chain.runtime.escrow(&chain.escrow).unwrap();
    assert!(escrow.items.is_empty());
    assert_eq!(escrow.boss, boss_pk);

    chain.submit(&holder, LISTING_PRICE).unwrap();
    assert_eq!(chain.runtime.escrow(&chain.escrow).unwrap().items.len(), 1);

    // outsiders cannot list
    let outsider = chain.create_user();
    let err = chain.submit(&outsider, LISTING_PRICE);
    assert_eq!(program_error(err).code(), 6002);
    assert_eq!(chain.runtime.escrow(&chain.escrow).unwrap().items.len(), 1);

    // never listed
    let buyer = chain.create_user();
    let early_pk = Pubkey::from(&early);
    let unlisted = EscrowItem {
        price: LISTING_PRICE,
        seller: early_pk,
    };
    let err = chain.purchase_secondary(&buyer, early_pk, boss_pk, unlisted);
    assert_eq!(program_error(err).code(), 6003);

    // listed, but the seller account is wrong
    let listed = EscrowItem {
        price: LISTING_PRICE,
        seller: holder_pk,
    };
    let err = chain.purchase_secondary(&buyer, boss_pk, boss_pk, listed);
    assert_eq!(program_error(err).code(), 6004);

    // right seller, wrong price
    let wrong_price = EscrowItem {
        price: LAMPORTS_PER_SOL / 5,
        seller: holder_pk,
    };
    let err = chain.purchase_secondary(&buyer, holder_pk, boss_pk, wrong_price);
    assert_eq!(program_error(err).code(), 6003);

    let buyer_pk = Pubkey::from(&buyer);
    let seller_before = chain.runtime.balance(&holder_pk);
    let boss_before = chain.runtime.balance(&boss_pk);
    let buyer_before = chain.runtime.balance(&buyer_pk);
    let events_before = chain.runtime.events().len();
    let receipt = chain
        .purchase_secondary(&buyer, holder_pk, boss_pk, listed)
        .unwrap();
    assert_eq!(receipt.transfers.len(), 2);
    assert_eq!(chain.runtime.events().len(), events_before + 1);
    assert_eq!(
        chain.runtime.events().last(),
        Some(&RuntimeEvent::Invocation {
            slot: receipt.slot,
            instruction: "purchase_secondary".to_string(),
            signer: buyer_pk,
            transfers: receipt.transfers.clone(),
        })
    );

    assert!(chain.runtime.escrow(&chain.escrow).unwrap().items.is_empty());
    let ledger = chain.runtime.ledger(&chain.ledger).unwrap();
    assert_eq!(ledger.owners.len(), 3);
    assert_eq!(ledger.holdings(&holder_pk), 1);
    assert_eq!(ledger.holdings(&buyer_pk), 1);
    assert_eq!(chain.runtime.balance(&holder_pk) - seller_before, 225_000_000);
    assert_eq!(chain.runtime.balance(&boss_pk) - boss_before, 25_000_000);
    assert_eq!(buyer_before - chain.runtime.balance(&buyer_pk), LISTING_PRICE);
}

#[test]
fn resale_trades_continue_after_sell_out() {
    let mut chain = Chain::new();
    let boss = chain.create_user();
    let boss_pk = Pubkey::from(&boss);
    chain.initialize_ledger(&boss, 1);
    let holder = chain.create_user();
    chain.purchase_primary(&holder, boss_pk).unwrap();
    assert_eq!(chain.remaining(), 0);

    chain.initialize_escrow(&holder);
    chain.submit(&holder, LISTING_PRICE).unwrap();
    let buyer = chain.create_user();
    let item = EscrowItem {
        price: LISTING_PRICE,
        seller: Pubkey::from(&holder),
    };
    chain
        .purchase_secondary(&buyer, Pubkey::from(&holder), boss_pk, item)
        .unwrap();

    // the new holder can relist what they bought
    chain.submit(&buyer, LISTING_PRICE * 2).unwrap();
    let ledger = chain.runtime.ledger(&chain.ledger).unwrap();
    assert_eq!(ledger.owners, vec![Pubkey::from(&buyer)]);
    let err = chain.submit(&holder, LISTING_PRICE);
    assert_eq!(program_error(err), ProgramError::NotOwner);
}

#[test]
fn buyer_without_funds_leaves_listing_in_place() {
    let mut chain = Chain::new();
    let boss = chain.create_user();
    let boss_pk = Pubkey::from(&boss);
    chain.initialize_ledger(&boss, 1);
    let holder = chain.create_user();
    chain.purchase_primary(&holder, boss_pk).unwrap();
    chain.initialize_escrow(&boss);
    chain.submit(&holder, 20 * LAMPORTS_PER_SOL).unwrap();

    let buyer = chain.create_user();
    let before = chain.runtime.snapshot();
    let events_before = chain.runtime.events().len();
    let item = EscrowItem {
        price: 20 * LAMPORTS_PER_SOL,
        seller: Pubkey::from(&holder),
    };
    let err = chain
        .purchase_secondary(&buyer, Pubkey::from(&holder), boss_pk, item)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InsufficientFunds { .. }));
    assert_eq!(chain.runtime.snapshot(), before);
    assert_eq!(chain.runtime.events().len(), events_before);
}
