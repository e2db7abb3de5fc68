use std::error::Error;

use clap::{Args, Parser, Subcommand};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use engine::{Engine, Money, TopUpCmd, TransferCmd, WithdrawCmd};
use migration::MigratorTrait;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "paybuddy_admin")]
#[command(about = "Admin utilities for the PayBuddy ledger (accounts, money movements)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./paybuddy.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations and seed the bank pseudo-account.
    Init,
    Account(Account),
    /// Credit an account from the outside world.
    TopUp(MoveArgs),
    /// Debit an account towards its registered IBAN/BIC.
    Withdraw(MoveArgs),
    /// Move money between two user accounts.
    Transfer(TransferArgs),
    /// Print an account's activity feed, newest first.
    Feed(FeedArgs),
}

#[derive(Args, Debug)]
struct Account {
    #[command(subcommand)]
    command: AccountCommand,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Create(AccountCreateArgs),
    Balance(AccountIdArgs),
    /// Register the external bank coordinates used by withdrawals.
    BankDetails(BankDetailsArgs),
}

#[derive(Args, Debug)]
struct AccountCreateArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    iban: Option<String>,
    #[arg(long)]
    bic: Option<String>,
}

#[derive(Args, Debug)]
struct AccountIdArgs {
    #[arg(long)]
    id: i32,
}

#[derive(Args, Debug)]
struct BankDetailsArgs {
    #[arg(long)]
    id: i32,
    #[arg(long)]
    iban: String,
    #[arg(long)]
    bic: String,
}

#[derive(Args, Debug)]
struct MoveArgs {
    #[arg(long)]
    account_id: i32,
    /// Decimal amount, e.g. `100.00` (`,` also accepted).
    #[arg(long)]
    amount: String,
    #[arg(long)]
    description: Option<String>,
    /// Idempotency key; generated when omitted so a rerun never double-applies.
    #[arg(long)]
    key: Option<String>,
}

#[derive(Args, Debug)]
struct TransferArgs {
    #[arg(long)]
    sender_id: i32,
    #[arg(long)]
    receiver_id: i32,
    #[arg(long)]
    amount: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    key: Option<String>,
}

#[derive(Args, Debug)]
struct FeedArgs {
    #[arg(long)]
    account_id: i32,
    #[arg(long, default_value_t = 20)]
    limit: u64,
    #[arg(long)]
    cursor: Option<String>,
}

fn parse_amount(raw: &str) -> Money {
    match raw.parse::<Money>() {
        Ok(amount) => amount,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    }
}

fn or_generated_key(key: Option<String>) -> String {
    key.unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

fn print_transaction(tx: &engine::Transaction) {
    println!(
        "#{} {} {} -> {} gross {} fee {} net {} {}",
        tx.id,
        tx.kind.as_str(),
        tx.sender_id,
        tx.receiver_id,
        tx.gross_amount,
        tx.fee_amount,
        tx.net_amount,
        tx.description.as_deref().unwrap_or("-"),
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "paybuddy_admin={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build()?;

    match cli.command {
        Command::Init => {
            let bank = engine
                .ensure_bank_account(&settings.bank.username, &settings.bank.email)
                .await?;
            println!("bank account ready: {} (#{})", bank.email, bank.id);
        }
        Command::Account(Account {
            command: AccountCommand::Create(args),
        }) => {
            let account = engine
                .create_account(
                    &args.username,
                    &args.email,
                    args.iban.as_deref(),
                    args.bic.as_deref(),
                )
                .await?;
            println!("created account: {} (#{})", account.email, account.id);
        }
        Command::Account(Account {
            command: AccountCommand::Balance(args),
        }) => {
            let balance = engine.get_balance(args.id).await?;
            println!("{balance}");
        }
        Command::Account(Account {
            command: AccountCommand::BankDetails(args),
        }) => {
            engine
                .update_bank_details(args.id, &args.iban, &args.bic)
                .await?;
            println!("bank details updated for account #{}", args.id);
        }
        Command::TopUp(args) => {
            let amount = parse_amount(&args.amount);
            let mut cmd =
                TopUpCmd::new(args.account_id, amount).idempotency_key(or_generated_key(args.key));
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            let tx = engine.top_up(cmd).await?;
            print_transaction(&tx);
        }
        Command::Withdraw(args) => {
            let amount = parse_amount(&args.amount);
            let mut cmd = WithdrawCmd::new(args.account_id, amount)
                .idempotency_key(or_generated_key(args.key));
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            let tx = engine.withdraw_to_bank(cmd).await?;
            print_transaction(&tx);
        }
        Command::Transfer(args) => {
            let amount = parse_amount(&args.amount);
            let mut cmd = TransferCmd::new(args.sender_id, args.receiver_id, amount)
                .idempotency_key(or_generated_key(args.key));
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            let tx = engine.transfer_p2p(cmd).await?;
            print_transaction(&tx);
        }
        Command::Feed(args) => {
            let page = engine
                .feed_for(args.account_id, args.limit, args.cursor.as_deref())
                .await?;
            for tx in &page.items {
                print_transaction(tx);
            }
            if let Some(cursor) = page.next_cursor {
                println!("next: --cursor {cursor}");
            }
        }
    }

    Ok(())
}
