//! Native wallet CLI
//!
//! Command-line front-end over the wallet core: account management,
//! network switching, balances and native-asset transfers.

use clap::{Parser, Subcommand};
use native_wallet::{
    engine::RpcChainClient, networks::NativeCurrency, units, Account, AccountKind, CancelToken,
    ChainClient, Error, FileStorage, Network, NetworkRegistry, Result, SecretVault,
    TransactionEngine, TransferJournal, TransferRequest, TransferSigner, WalletStore,
};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "native-wallet")]
#[command(about = "Local key management and native-asset transfers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Wallet data directory
    #[arg(long, global = true, default_value = ".native-wallet")]
    data_dir: PathBuf,

    /// Password for encrypting/decrypting account secrets
    /// (falls back to the WALLET_PASSWORD environment variable)
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a BIP-39 mnemonic phrase
    Mnemonic {
        /// Entropy in bits (128 = 12 words, 256 = 24 words)
        #[arg(long, default_value_t = 128)]
        strength: usize,
    },

    /// Create a new account with a freshly generated key
    New {
        /// Display name
        name: String,
    },

    /// Import an account from a 0x-prefixed private key
    ImportKey {
        key: String,
        name: String,
    },

    /// Import accounts from a BIP-39 mnemonic
    ImportMnemonic {
        phrase: String,
        name: String,

        /// Derivation index (ignored when --count > 1)
        #[arg(long, default_value_t = 0)]
        index: u32,

        /// Derive this many sequential accounts (1-10)
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// List accounts
    List,

    /// Select the active account
    Select { id: Uuid },

    /// Rename an account
    Rename { id: Uuid, name: String },

    /// Remove an account
    Remove { id: Uuid },

    /// Decrypt and print an account's private key
    ExportKey { id: Uuid },

    /// List known networks
    Networks,

    /// Register a custom network
    AddNetwork {
        chain_id: u64,
        name: String,
        rpc: String,

        /// Native currency symbol
        #[arg(long, default_value = "ETH")]
        symbol: String,

        #[arg(long)]
        explorer: Option<String>,

        #[arg(long)]
        testnet: bool,
    },

    /// Remove a custom network
    RemoveNetwork { chain_id: u64 },

    /// Select the active network
    UseNetwork { chain_id: u64 },

    /// Show the selected account's balance on the selected network
    Balance,

    /// Send native currency to a recipient
    Send {
        /// Recipient address
        to: String,

        /// Amount in native currency units (e.g. "0.05")
        amount: String,

        /// Return right after broadcast instead of awaiting confirmation
        #[arg(long)]
        no_wait: bool,
    },

    /// Show past transfers, oldest first
    History,
}

/// Everything a subcommand needs, wired over one file-backed storage
struct App {
    store: WalletStore,
    registry: NetworkRegistry,
    journal: TransferJournal,
}

impl App {
    fn open(data_dir: &PathBuf) -> Result<Self> {
        let storage = Arc::new(FileStorage::open(data_dir)?);
        Ok(Self {
            store: WalletStore::new(storage.clone(), SecretVault::default()),
            registry: NetworkRegistry::new(storage.clone()),
            journal: TransferJournal::new(storage),
        })
    }

    async fn selected_account(&self) -> Result<Account> {
        self.store
            .selected()
            .await?
            .ok_or_else(|| Error::NotFound("no account selected".to_string()))
    }
}

fn password(cli: &Cli) -> Result<SecretString> {
    if let Some(p) = &cli.password {
        return Ok(SecretString::from(p.clone()));
    }
    std::env::var("WALLET_PASSWORD")
        .map(SecretString::from)
        .map_err(|_| {
            Error::InvalidParameter(
                "password required: pass --password or set WALLET_PASSWORD".to_string(),
            )
        })
}

fn print_account(account: &Account, selected: bool) {
    let marker = if selected { "*" } else { " " };
    let path = account.derivation_path.as_deref().unwrap_or("-");
    println!(
        "{} {}  {}  {:<11} {:<24} {}",
        marker,
        account.id,
        account.checksummed(),
        format!("{:?}", account.kind).to_lowercase(),
        account.display_name,
        path
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let app = App::open(&cli.data_dir)?;

    match &cli.command {
        Commands::Mnemonic { strength } => {
            println!("{}", native_wallet::keys::generate_mnemonic(*strength)?);
        }
        Commands::New { name } => {
            let account = app.store.create_account(name, &password(&cli)?).await?;
            println!("Created {} ({})", account.checksummed(), account.id);
        }
        Commands::ImportKey { key, name } => {
            let account = app
                .store
                .import_private_key(key, name, &password(&cli)?)
                .await?;
            println!("Imported {} ({})", account.checksummed(), account.id);
        }
        Commands::ImportMnemonic {
            phrase,
            name,
            index,
            count,
        } => {
            let pw = password(&cli)?;
            if *count > 1 {
                let created = app
                    .store
                    .accounts_from_mnemonic(phrase, name, *count, &pw)
                    .await?;
                for account in &created {
                    println!(
                        "Imported {} at {}",
                        account.checksummed(),
                        account.derivation_path.as_deref().unwrap_or("-")
                    );
                }
            } else {
                let account = app.store.import_mnemonic(phrase, name, &pw, *index).await?;
                println!("Imported {} ({})", account.checksummed(), account.id);
            }
        }
        Commands::List => {
            let selected = app.store.selected().await?.map(|a| a.id);
            for account in app.store.list().await? {
                print_account(&account, selected == Some(account.id));
            }
        }
        Commands::Select { id } => {
            app.store.select_account(*id).await?;
            println!("Selected {id}");
        }
        Commands::Rename { id, name } => {
            app.store.rename_account(*id, name).await?;
        }
        Commands::Remove { id } => {
            app.store.remove_account(*id).await?;
        }
        Commands::ExportKey { id } => {
            use secrecy::ExposeSecret;
            let key = app.store.export_private_key(*id, &password(&cli)?).await?;
            // Printed on explicit user request only
            println!("{}", key.expose_secret());
        }
        Commands::Networks => {
            let current = app.registry.current().await?;
            for network in app.registry.list_all().await? {
                let marker = if network.chain_id == current.chain_id {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:>10}  {:<20} {} ({})",
                    marker,
                    network.chain_id,
                    network.display_name,
                    network.rpc_endpoint,
                    network.native_currency.symbol
                );
            }
        }
        Commands::AddNetwork {
            chain_id,
            name,
            rpc,
            symbol,
            explorer,
            testnet,
        } => {
            app.registry
                .add_custom(Network {
                    chain_id: *chain_id,
                    display_name: name.clone(),
                    rpc_endpoint: rpc.clone(),
                    native_currency: NativeCurrency {
                        name: symbol.clone(),
                        symbol: symbol.clone(),
                        decimals: 18,
                    },
                    explorer_url: explorer.clone(),
                    testnet: *testnet,
                })
                .await?;
            println!("Added network {chain_id}");
        }
        Commands::RemoveNetwork { chain_id } => {
            app.registry.remove_custom(*chain_id).await?;
        }
        Commands::UseNetwork { chain_id } => {
            app.registry.set_current(*chain_id).await?;
            println!("Switched to network {chain_id}");
        }
        Commands::Balance => {
            let account = app.selected_account().await?;
            let network = app.registry.current().await?;
            let client = RpcChainClient::from_network(&network);
            let balance = client.get_balance(account.address).await?;
            println!(
                "{} {} ({})",
                units::format_units(balance, network.native_currency.decimals as u32),
                network.native_currency.symbol,
                account.checksummed()
            );
        }
        Commands::Send {
            to,
            amount,
            no_wait,
        } => {
            send(&cli, &app, to, amount, *no_wait).await?;
        }
        Commands::History => {
            for record in app.journal.load().await? {
                println!(
                    "{}  {:<7}  {} -> {}  {} wei  {}",
                    record.submitted_at.format("%Y-%m-%d %H:%M:%S"),
                    format!("{:?}", record.status).to_lowercase(),
                    record.from,
                    record.to,
                    record.amount,
                    record.hash.map(|h| h.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }

    Ok(())
}

async fn send(cli: &Cli, app: &App, to: &str, amount: &str, no_wait: bool) -> Result<()> {
    let account = app.selected_account().await?;
    let network = app.registry.current().await?;
    let client = Arc::new(RpcChainClient::from_network(&network));
    let engine = TransactionEngine::new(client.clone());

    let amount = units::parse_units(amount, network.native_currency.decimals as u32)?;
    let known_balance = client.get_balance(account.address).await.ok();

    tracing::info!(
        from = %account.checksummed(),
        to = %to,
        amount = %amount,
        chain_id = network.chain_id,
        "Submitting transfer"
    );

    let submitted = {
        // Decrypted key lives only for this block
        let signer = match account.kind {
            AccountKind::External => {
                return Err(Error::InvalidParameter(
                    "external accounts sign through their own wallet, not this CLI".to_string(),
                ))
            }
            _ => TransferSigner::Local(
                app.store
                    .signer_for(account.id, &password(cli)?)
                    .await?,
            ),
        };
        engine
            .submit_transfer(
                &signer,
                &TransferRequest {
                    to: to.to_string(),
                    amount,
                    known_balance,
                },
            )
            .await
    };

    // Failed broadcasts leave a record too; journal whatever exists
    for record in engine.history().await {
        app.journal.record(&record).await?;
    }
    let id = submitted?;

    let record = engine.get(id).await.expect("record exists after submit");
    println!(
        "Submitted {}",
        record.hash.map(|h| h.to_string()).unwrap_or_default()
    );

    if no_wait {
        return Ok(());
    }

    let token = CancelToken::new();
    tokio::select! {
        outcome = engine.track(id, token.observer()) => {
            println!("Outcome: {:?}", outcome?);
        }
        _ = tokio::signal::ctrl_c() => {
            token.cancel();
            println!("Stopped watching; the transaction may still confirm on-chain");
        }
    }

    let record = engine.get(id).await.expect("record exists");
    app.journal.record(&record).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
