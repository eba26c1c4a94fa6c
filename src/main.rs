// somos: drive the sale ledger from the command line against a local state file

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::info;

use somos_ledger::{
    escrow::EscrowItem,
    ledger::{Ledger, LedgerPhase},
    instruction::{Instruction, Invocation, SignedInvocation},
    pubkey::Pubkey,
    runtime::{Receipt, Runtime, RuntimeConfig},
    settlement::{parse_sol, FeeRate, Lamports, LAMPORTS_PER_SOL},
    store::{read_keypair, write_keypair, StateFile},
};

#[derive(Parser)]
#[command(name = "somos")]
#[command(about = "Primary/secondary sale ledger with resale escrow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// State file holding balances and records
    #[arg(long, global = true, env = "SOMOS_STATE", default_value = "somos-state.json")]
    state: PathBuf,

    /// Program id used when a new state file is created
    #[arg(long, global = true, env = "SOMOS_PROGRAM_ID")]
    program_id: Option<Pubkey>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an ed25519 keypair file
    Keygen {
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Fund an account
    Airdrop {
        #[arg(long)]
        to: Pubkey,
        #[arg(long, value_parser = sol_amount, default_value = "10")]
        sol: Lamports,
    },

    /// Show an account balance in lamports
    Balance { account: Pubkey },

    /// Create a ledger; the signer becomes its boss
    InitLedger {
        #[arg(short, long)]
        keypair: PathBuf,
        #[arg(long)]
        seed: String,
        #[arg(long)]
        supply: u64,
        #[arg(long, value_parser = sol_amount)]
        price_sol: Lamports,
        /// Fraction (0.10) or percentage (10%)
        #[arg(long)]
        resale_fee: FeeRate,
    },

    /// Buy one unit of primary supply
    PurchasePrimary {
        #[arg(short, long)]
        keypair: PathBuf,
        #[arg(long)]
        ledger: Pubkey,
        #[arg(long)]
        boss: Pubkey,
    },

    /// Create the resale escrow for a ledger
    InitEscrow {
        #[arg(short, long)]
        keypair: PathBuf,
        #[arg(long)]
        seed: String,
        #[arg(long)]
        ledger: Pubkey,
    },

    /// List one held unit for resale
    Submit {
        #[arg(short, long)]
        keypair: PathBuf,
        #[arg(long)]
        escrow: Pubkey,
        #[arg(long)]
        ledger: Pubkey,
        #[arg(long, value_parser = sol_amount)]
        price_sol: Lamports,
    },

    /// Buy a listed unit from the escrow
    PurchaseSecondary {
        #[arg(short, long)]
        keypair: PathBuf,
        #[arg(long)]
        escrow: Pubkey,
        #[arg(long)]
        ledger: Pubkey,
        /// Seller account to pay
        #[arg(long)]
        seller: Pubkey,
        #[arg(long)]
        boss: Pubkey,
        #[arg(long, value_parser = sol_amount)]
        price_sol: Lamports,
        /// Seller named in the listing descriptor; defaults to --seller
        #[arg(long)]
        listing_seller: Option<Pubkey>,
    },

    /// Print a ledger record and its sale phase as JSON
    ShowLedger { address: Pubkey },

    /// Print an escrow record as JSON
    ShowEscrow {
        address: Pubkey,
        /// Only print the listings of this seller
        #[arg(long)]
        seller: Option<Pubkey>,
    },

    /// Print the full state snapshot with its state root
    Snapshot,
}

#[derive(Serialize)]
struct LedgerView<'a> {
    phase: LedgerPhase,
    #[serde(flatten)]
    ledger: &'a Ledger,
}

fn sol_amount(s: &str) -> Result<Lamports, String> {
    parse_sol(s).ok_or_else(|| format!("invalid SOL amount {s:?} (at most 9 decimals)"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_key(path: &Path) -> anyhow::Result<SigningKey> {
    read_keypair(path).with_context(|| format!("loading keypair {}", path.display()))
}

/// Signs `instruction` with `key`, executes it and persists the new state.
fn submit(
    store: &StateFile,
    runtime: &mut Runtime,
    key: &SigningKey,
    instruction: Instruction,
) -> anyhow::Result<Receipt> {
    let invocation = Invocation {
        program_id: runtime.program_id(),
        nonce: rand::random(),
        instruction,
    };
    let signed = SignedInvocation::sign(key, invocation)?;
    let receipt = runtime.execute(&signed).map_err(|err| match err.code() {
        Some(code) => anyhow!("{err} (error code {code})"),
        None => anyhow!(err),
    })?;
    store.save(runtime)?;
    Ok(receipt)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = StateFile::new(&cli.state);
    let config = match cli.program_id {
        Some(program_id) => RuntimeConfig { program_id },
        None => RuntimeConfig::default(),
    };

    match cli.command {
        Commands::Keygen { out } => {
            let sk = SigningKey::generate(&mut OsRng);
            write_keypair(&out, &sk)?;
            info!(path = %out.display(), "keypair written");
            println!("{}", Pubkey::from(&sk));
        }
        Commands::Airdrop { to, sol } => {
            let mut runtime = store.load_or_init(config)?;
            runtime.airdrop(&to, sol)?;
            store.save(&runtime)?;
            println!("{}", runtime.balance(&to));
        }
        Commands::Balance { account } => {
            let runtime = store.load_or_init(config)?;
            let lamports = runtime.balance(&account);
            println!(
                "{lamports} lamports ({}.{:09} SOL)",
                lamports / LAMPORTS_PER_SOL,
                lamports % LAMPORTS_PER_SOL
            );
        }
        Commands::InitLedger {
            keypair,
            seed,
            supply,
            price_sol,
            resale_fee,
        } => {
            let key = load_key(&keypair)?;
            let mut runtime = store.load_or_init(config)?;
            let ledger = runtime.derive_address(seed.as_bytes());
            let instruction = Instruction::InitializeLedger {
                user: Pubkey::from(&key),
                ledger,
                seed: seed.into_bytes(),
                supply,
                price: price_sol,
                resale_fee,
            };
            submit(&store, &mut runtime, &key, instruction)?;
            println!("{ledger}");
        }
        Commands::PurchasePrimary {
            keypair,
            ledger,
            boss,
        } => {
            let key = load_key(&keypair)?;
            let mut runtime = store.load_or_init(config)?;
            let instruction = Instruction::PurchasePrimary {
                user: Pubkey::from(&key),
                boss,
                ledger,
            };
            let receipt = submit(&store, &mut runtime, &key, instruction)?;
            print_json(&receipt)?;
        }
        Commands::InitEscrow {
            keypair,
            seed,
            ledger,
        } => {
            let key = load_key(&keypair)?;
            let mut runtime = store.load_or_init(config)?;
            let escrow = runtime.derive_address(seed.as_bytes());
            let instruction = Instruction::InitializeEscrow {
                user: Pubkey::from(&key),
                escrow,
                ledger,
                seed: seed.into_bytes(),
            };
            submit(&store, &mut runtime, &key, instruction)?;
            println!("{escrow}");
        }
        Commands::Submit {
            keypair,
            escrow,
            ledger,
            price_sol,
        } => {
            let key = load_key(&keypair)?;
            let mut runtime = store.load_or_init(config)?;
            let instruction = Instruction::SubmitToEscrow {
                seller: Pubkey::from(&key),
                escrow,
                ledger,
                price: price_sol,
            };
            let receipt = submit(&store, &mut runtime, &key, instruction)?;
            print_json(&receipt)?;
        }
        Commands::PurchaseSecondary {
            keypair,
            escrow,
            ledger,
            seller,
            boss,
            price_sol,
            listing_seller,
        } => {
            let key = load_key(&keypair)?;
            let mut runtime = store.load_or_init(config)?;
            let instruction = Instruction::PurchaseSecondary {
                buyer: Pubkey::from(&key),
                seller,
                boss,
                escrow,
                ledger,
                item: EscrowItem {
                    price: price_sol,
                    seller: listing_seller.unwrap_or(seller),
                },
            };
            let receipt = submit(&store, &mut runtime, &key, instruction)?;
            print_json(&receipt)?;
        }
        Commands::ShowLedger { address } => {
            let runtime = store.load_or_init(config)?;
            let ledger = runtime
                .ledger(&address)
                .ok_or_else(|| anyhow!("no ledger at {address}"))?;
            print_json(&LedgerView {
                phase: ledger.phase(),
                ledger,
            })?;
        }
        Commands::ShowEscrow { address, seller } => {
            let runtime = store.load_or_init(config)?;
            let escrow = runtime
                .escrow(&address)
                .ok_or_else(|| anyhow!("no escrow at {address}"))?;
            match seller {
                Some(seller) => {
                    let listings: Vec<&EscrowItem> = escrow.listings_by(&seller).collect();
                    print_json(&listings)?;
                }
                None => print_json(escrow)?,
            }
        }
        Commands::Snapshot => {
            let runtime = store.load_or_init(config)?;
            let snapshot = runtime.snapshot();
            print_json(&snapshot)?;
            println!("state root: {}", hex::encode(snapshot.state_root));
        }
    }

    Ok(())
}
