mod args;

pub use args::{Args, Commands, TransactionsArgs, UserArgs};
use clap::Parser;
use common::{Database, TransactionFilter};

/// Runs the CLI command parser and executes the selected command.
/// Returns true if a CLI command was handled, false otherwise.
pub async fn run_cli() -> bool {
    let args = Args::parse();
    let Some(command) = &args.command else {
        return false;
    };

    let result = match command {
        Commands::Migrate => migrate().await,
        Commands::ShowWallet(user) => show_wallet(&user.user_id).await,
        Commands::Transactions(tx_args) => {
            show_transactions(&tx_args.user_id, tx_args.limit).await
        }
        Commands::Reconcile(user) => reconcile(&user.user_id).await,
    };
    if let Err(e) = result {
        eprintln!("Command failed: {e:#}");
    }
    true
}

/// Connects using DATABASE_URL and applies migrations.
async fn connect() -> anyhow::Result<Database> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
    let db = Database::new(&database_url).await?;
    db.migrate().await?;
    Ok(db)
}

async fn migrate() -> anyhow::Result<()> {
    connect().await?;
    println!("Migrations applied successfully.");
    Ok(())
}

async fn show_wallet(user_id: &str) -> anyhow::Result<()> {
    let db = connect().await?;
    let wallet = db.get_or_create_wallet(user_id).await?;
    println!(
        "Wallet {} (user {})\n balance: {}\n earned:  {}\n spent:   {}\n connected: {} ({})",
        wallet.id,
        wallet.user_id,
        wallet.nwt_balance,
        wallet.total_earned,
        wallet.total_spent,
        wallet.connected_wallet_address.as_deref().unwrap_or("-"),
        wallet.wallet_type.map(|t| t.as_str()).unwrap_or("-"),
    );
    Ok(())
}

async fn show_transactions(user_id: &str, limit: i64) -> anyhow::Result<()> {
    let db = connect().await?;
    let filter = TransactionFilter {
        limit: Some(limit),
        ..Default::default()
    };
    let transactions = db.list_transactions(user_id, &filter).await?;
    if transactions.is_empty() {
        println!("No transactions for user {}.", user_id);
    }
    for tx in transactions {
        println!(
            "#{} {} {:<8} {:>20} {:<9} {}",
            tx.id,
            tx.created_at,
            tx.kind.as_str(),
            tx.amount,
            tx.status.as_str(),
            tx.external_transaction_id
                .or(tx.description)
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn reconcile(user_id: &str) -> anyhow::Result<()> {
    let db = connect().await?;
    let report = db.reconcile_wallet(user_id).await?;
    if report.consistent {
        println!("Wallet {} is consistent: {}", report.wallet_id, report.stored);
    } else {
        println!(
            "Wallet {} is OUT OF BALANCE: stored {}, computed {}",
            report.wallet_id, report.stored, report.computed
        );
    }
    Ok(())
}
