use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "NWT wallet service - run the API or manage the ledger")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending database migrations and exit
    Migrate,

    /// Print a user's wallet, creating it if it does not exist yet
    ShowWallet(UserArgs),

    /// Print a user's most recent transactions
    Transactions(TransactionsArgs),

    /// Recompute a wallet balance from completed transactions
    ///
    /// Compares the stored balance with the sum of completed purchases
    /// minus completed spends and reports any drift.
    Reconcile(UserArgs),
}

#[derive(ClapArgs, Debug)]
pub struct UserArgs {
    /// Id of the wallet owner
    #[arg(short, long, help = "Id of the wallet owner")]
    pub user_id: String,
}

#[derive(ClapArgs, Debug)]
pub struct TransactionsArgs {
    /// Id of the wallet owner
    #[arg(short, long, help = "Id of the wallet owner")]
    pub user_id: String,

    /// Maximum number of transactions to print
    #[arg(short, long, default_value_t = 20, help = "Maximum number of transactions to print")]
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reconcile() {
        let args = Args::parse_from(["nwt_service", "reconcile", "--user-id", "alice"]);
        match args.command {
            Some(Commands::Reconcile(user)) => assert_eq!(user.user_id, "alice"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn no_subcommand_runs_server() {
        let args = Args::parse_from(["nwt_service"]);
        assert!(args.command.is_none());
    }

    #[test]
    fn transactions_limit_defaults() {
        let args = Args::parse_from(["nwt_service", "transactions", "-u", "bob"]);
        match args.command {
            Some(Commands::Transactions(tx)) => assert_eq!(tx.limit, 20),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
