#![cfg(not(tarpaulin_include))]

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fintrack::cache::{FileStore, LocalCache};
use fintrack::client::{HttpTransport, SyncClient};
use fintrack::ledger::{CategoryInput, GoalInput, GoalPatch, TransactionInput, TransactionPatch};
use fintrack::model::{Kind, format_idr, parse_amount};
use fintrack::{FinError, Result, summary};

/// Offline-first FinTrack client. Edits are stored locally and pushed to the
/// server whenever it can be reached.
#[derive(Parser)]
#[command(name = "fintrack", version, about)]
struct Cli {
    /// API root of the FinTrack server
    #[arg(long, default_value = "http://127.0.0.1:3000/api")]
    server: String,

    /// Local cache file
    #[arg(long, default_value = "fintrack-cache.json")]
    store: PathBuf,

    /// Do not contact the server
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Record a transaction. Amounts accept `1.500.000` style grouping.
    Add {
        #[arg(long = "type", default_value = "expense")]
        kind: Kind,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        category: String,
        #[arg(long, default_value = "")]
        description: String,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List transactions, newest first
    List,
    /// Change some fields of a transaction; the others are kept.
    Edit {
        id: String,
        #[arg(long = "type")]
        kind: Option<Kind>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Delete {
        id: String,
    },
    Category {
        #[arg(long)]
        name: String,
        #[arg(long = "type", default_value = "expense")]
        kind: Kind,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Remove a custom category. Default categories cannot be deleted.
    DeleteCategory {
        name: String,
        #[arg(long = "type", default_value = "expense")]
        kind: Kind,
    },
    Budget {
        category: String,
        amount: String,
    },
    DeleteBudget {
        category: String,
    },
    Goal {
        #[arg(long)]
        name: String,
        #[arg(long)]
        target: String,
        #[arg(long, default_value = "0")]
        current: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List savings goals with their ids
    Goals,
    UpdateGoal {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        current: Option<String>,
        #[arg(long, conflicts_with = "no_date")]
        date: Option<NaiveDate>,
        /// Remove the target date
        #[arg(long)]
        no_date: bool,
    },
    DeleteGoal {
        id: String,
    },
    /// Change the login email. Needs the server.
    ChangeEmail {
        email: String,
    },
    /// Dashboard figures for the current month
    Summary,
    /// Push local changes and pull the server copy
    Sync,
}

fn amount(text: &str) -> Result<f64> {
    parse_amount(text)
        .ok_or_else(|| FinError::validation(format!("\"{}\" is not an amount", text)))
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let cache = LocalCache::new(FileStore::open(&cli.store)?);
    let mut client = SyncClient::new(cache, HttpTransport::new(&cli.server));
    if cli.offline {
        client.set_online(false).await?;
    }

    match cli.command {
        Cmd::Register { name, email, password } => {
            let grant = client.register(&name, &email, &password).await?;
            println!("Registered and logged in as {}", grant.user.email);
        }
        Cmd::Login { email, password } => {
            let grant = client.login(&email, &password).await?;
            println!("Welcome back, {}", grant.user.name);
        }
        Cmd::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Cmd::Add { kind, amount: text, category, description, date } => {
            let input = TransactionInput {
                description,
                amount: amount(&text)?,
                kind,
                category,
                date: date.unwrap_or_else(|| Local::now().date_naive()),
            };
            let tx = client.record(|cache| cache.add_transaction(input)).await?;
            println!("Added {} {} ({})", tx.kind, format_idr(tx.amount), tx.id);
        }
        Cmd::List => {
            let mut transactions = client.data()?.ledger.transactions;
            transactions.sort_by(|a, b| b.date.cmp(&a.date));
            for tx in transactions {
                let signed = match tx.kind {
                    Kind::Income => tx.amount,
                    Kind::Expense => -tx.amount,
                };
                println!(
                    "{}  {:<14} {:>16}  {}  [{}]",
                    tx.date,
                    tx.category,
                    format_idr(signed),
                    tx.description,
                    tx.id
                );
            }
        }
        Cmd::Edit { id, kind, amount: text, category, description, date } => {
            let patch = TransactionPatch {
                description,
                amount: text.as_deref().map(amount).transpose()?,
                kind,
                category,
                date,
            };
            let tx = client.record(|cache| cache.update_transaction(&id, patch)).await?;
            println!("Updated {}: {} {}", tx.id, tx.category, format_idr(tx.amount));
        }
        Cmd::Delete { id } => {
            client.record(|cache| cache.delete_transaction(&id)).await?;
            println!("Deleted {}", id);
        }
        Cmd::Category { name, kind, icon } => {
            let input = CategoryInput { name, kind, icon_key: icon };
            let category = client.record(|cache| cache.add_category(input)).await?;
            println!("Added {} category {}", category.kind, category.name);
        }
        Cmd::DeleteCategory { name, kind } => {
            client.record(|cache| cache.delete_category(&name, kind)).await?;
            println!("Deleted {} category {}", kind, name);
        }
        Cmd::Budget { category, amount: text } => {
            let value = amount(&text)?;
            client.record(|cache| cache.set_budget(&category, value)).await?;
            println!("Budget for {} set to {}", category, format_idr(value));
        }
        Cmd::DeleteBudget { category } => {
            client.record(|cache| cache.delete_budget(&category)).await?;
            println!("Budget for {} removed", category);
        }
        Cmd::Goal { name, target, current, date } => {
            let input = GoalInput {
                name,
                target_amount: amount(&target)?,
                current_amount: amount(&current)?,
                target_date: date,
            };
            let goal = client.record(|cache| cache.add_goal(input)).await?;
            println!("Goal {} targets {}", goal.name, format_idr(goal.target_amount));
        }
        Cmd::Goals => {
            for goal in client.data()?.ledger.goals {
                let due = goal.target_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:<20} {:>16} of {:>16}  due {}  [{}]",
                    goal.name,
                    format_idr(goal.current_amount),
                    format_idr(goal.target_amount),
                    due,
                    goal.id
                );
            }
        }
        Cmd::UpdateGoal { id, name, target, current, date, no_date } => {
            let patch = GoalPatch {
                name,
                target_amount: target.as_deref().map(amount).transpose()?,
                current_amount: current.as_deref().map(amount).transpose()?,
                target_date: if no_date { Some(None) } else { date.map(Some) },
            };
            let goal = client.record(|cache| cache.update_goal(&id, patch)).await?;
            println!(
                "Goal {} at {} of {}",
                goal.name,
                format_idr(goal.current_amount),
                format_idr(goal.target_amount)
            );
        }
        Cmd::DeleteGoal { id } => {
            client.record(|cache| cache.delete_goal(&id)).await?;
            println!("Deleted goal {}", id);
        }
        Cmd::ChangeEmail { email } => {
            let profile = client.change_email(&email).await?;
            println!("Email changed to {}", profile.email);
        }
        Cmd::Summary => {
            let data = client.data()?;
            let board = summary::dashboard(&data.ledger, Local::now().date_naive());
            println!("Balance:   {}", format_idr(board.totals.total_balance));
            println!("Income:    {}", format_idr(board.totals.monthly_income));
            println!("Expenses:  {}", format_idr(board.totals.monthly_expenses));
            println!("Savings:   {:.1}%", board.totals.savings_rate);
            for line in board.budgets {
                println!(
                    "  {:<14} {:>16} of {:>16}  {:>5.1}%",
                    line.category,
                    format_idr(line.spent),
                    format_idr(line.budget),
                    line.progress
                );
            }
            for goal in board.goals {
                let flag = if goal.overdue { " (overdue)" } else { "" };
                println!("  goal {:<20} {:>5.1}%{}", goal.name, goal.progress, flag);
            }
        }
        Cmd::Sync => {
            let report = client.synchronize().await?;
            println!(
                "Synced: {} transactions, {} goals on the server",
                report.pulled_transactions, report.pulled_goals
            );
        }
    }

    if !client.is_online() {
        println!("(offline: changes are kept locally until the next sync)");
    }
    Ok(())
}
