use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand::rngs::SmallRng;

use pewpi_core::{
    MarketFeed, SortKey, SortOrder, TokenDraft, TokenPatch, TokenQuery, now_unix_secs,
    rank_matches, seed_for_symbol, unix_to_iso8601,
};
use pewpi_store::LedgerHome;

#[derive(Parser)]
#[command(name = "pewpi", about = "pewpi token ledger CLI")]
struct Cli {
    /// Ledger name (overrides PEWPI_LEDGER)
    #[arg(long, global = true)]
    ledger: Option<String>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortField {
    Name,
    Symbol,
    Amount,
    Created,
    Updated,
}

impl From<SortField> for SortKey {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Name => SortKey::Name,
            SortField::Symbol => SortKey::Symbol,
            SortField::Amount => SortKey::Amount,
            SortField::Created => SortKey::CreatedAt,
            SortField::Updated => SortKey::UpdatedAt,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a token and credit its creator
    Create {
        name: String,
        symbol: String,
        amount: u64,
        creator: String,
        /// Extra metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },

    /// List tokens matching exact-match filters
    List {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        creator: Option<String>,
        #[arg(long, value_enum)]
        sort: Option<SortField>,
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one token by id
    Show { id: String },

    /// Patch a token's fields
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        amount: Option<u64>,
        #[arg(long)]
        creator: Option<String>,
    },

    /// Delete a token by id
    Delete { id: String },

    /// Show a user's balance for a symbol
    Balance { user: String, symbol: String },

    /// Spend from a user's balance
    Spend {
        user: String,
        symbol: String,
        amount: u64,
    },

    /// Move balance between users
    Transfer {
        from: String,
        to: String,
        symbol: String,
        amount: u64,
    },

    /// Run one redistribution sweep
    Sweep,

    /// Issue or verify magic links
    #[command(subcommand)]
    Link(LinkCommands),

    /// Print simulated prices for a symbol
    Ticker {
        symbol: String,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },

    /// Rank candidates by embedding similarity
    Match {
        key: String,
        #[arg(required = true)]
        candidates: Vec<String>,
    },

    /// Show ledger statistics
    Stats,

    /// Export the ledger to a JSON file
    Export { path: PathBuf },

    /// Import a ledger from a JSON file
    Import { path: PathBuf },

    /// Run periodic sweeps and a price ticker until interrupted
    Watch {
        /// Seconds between sweeps
        #[arg(long, default_value_t = 3600)]
        sweep_secs: u64,
        /// Symbol to tick prices for
        #[arg(long)]
        symbol: Option<String>,
        /// Seconds between price ticks
        #[arg(long, default_value_t = 5)]
        tick_secs: u64,
    },
}

#[derive(Subcommand)]
enum LinkCommands {
    /// Issue a magic link; prints the token
    Issue { email: String },
    /// Verify and consume a magic link
    Verify { token: String },
}

fn open_home(cli: &Cli) -> Result<LedgerHome> {
    let base_dir = std::env::var("PEWPI_DATA_DIR").ok().map(PathBuf::from);
    LedgerHome::open(cli.ledger.as_deref(), base_dir.as_deref())
        .context("failed to open ledger")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Create {
            name,
            symbol,
            amount,
            creator,
            metadata,
        } => cmd_create(&cli, name, symbol, *amount, creator, metadata.as_deref()),
        Commands::List {
            symbol,
            creator,
            sort,
            desc,
            skip,
            limit,
        } => cmd_list(
            &cli,
            symbol.as_deref(),
            creator.as_deref(),
            *sort,
            *desc,
            *skip,
            *limit,
        ),
        Commands::Show { id } => cmd_show(&cli, id),
        Commands::Update {
            id,
            name,
            symbol,
            amount,
            creator,
        } => cmd_update(&cli, id, name, symbol, *amount, creator),
        Commands::Delete { id } => cmd_delete(&cli, id),
        Commands::Balance { user, symbol } => cmd_balance(&cli, user, symbol),
        Commands::Spend {
            user,
            symbol,
            amount,
        } => cmd_spend(&cli, user, symbol, *amount),
        Commands::Transfer {
            from,
            to,
            symbol,
            amount,
        } => cmd_transfer(&cli, from, to, symbol, *amount),
        Commands::Sweep => cmd_sweep(&cli),
        Commands::Link(link) => match link {
            LinkCommands::Issue { email } => cmd_link_issue(&cli, email),
            LinkCommands::Verify { token } => cmd_link_verify(&cli, token),
        },
        Commands::Ticker { symbol, count } => cmd_ticker(&cli, symbol, *count),
        Commands::Match { key, candidates } => cmd_match(key, candidates),
        Commands::Stats => cmd_stats(&cli),
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::Import { path } => cmd_import(&cli, path),
        Commands::Watch {
            sweep_secs,
            symbol,
            tick_secs,
        } => cmd_watch(&cli, *sweep_secs, symbol.as_deref(), *tick_secs).await,
    }
}

fn cmd_create(
    cli: &Cli,
    name: &str,
    symbol: &str,
    amount: u64,
    creator: &str,
    metadata: Option<&str>,
) -> Result<()> {
    let home = open_home(cli)?;
    let metadata = match metadata {
        Some(json) => serde_json::from_str(json).context("metadata must be a JSON object")?,
        None => serde_json::Map::new(),
    };

    let draft = TokenDraft {
        name: name.to_string(),
        symbol: symbol.to_string(),
        amount,
        creator: creator.to_string(),
        metadata,
    };
    let mut rng = SmallRng::from_os_rng();
    let token = home
        .store()
        .create_token(draft, now_unix_secs(), &mut rng)
        .context("failed to create token")?;

    println!("{}", token.id);
    Ok(())
}

fn cmd_list(
    cli: &Cli,
    symbol: Option<&str>,
    creator: Option<&str>,
    sort: Option<SortField>,
    desc: bool,
    skip: usize,
    limit: Option<usize>,
) -> Result<()> {
    let home = open_home(cli)?;

    let mut query = TokenQuery::new().skip(skip);
    if let Some(symbol) = symbol {
        query = query.symbol(symbol);
    }
    if let Some(creator) = creator {
        query = query.creator(creator);
    }
    if let Some(field) = sort {
        let order = if desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        query = query.sort(field.into(), order);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }

    let tokens = home.store().find_tokens(&query)?;
    if tokens.is_empty() {
        println!("(no tokens)");
        return Ok(());
    }
    for token in tokens {
        println!(
            "{}  {:<12} {:>10}  {}  {}",
            token.id,
            token.symbol,
            token.amount,
            token.creator,
            unix_to_iso8601(token.created_at),
        );
    }
    Ok(())
}

fn cmd_show(cli: &Cli, id: &str) -> Result<()> {
    let home = open_home(cli)?;
    let token = home
        .store()
        .get_token(id)?
        .with_context(|| format!("token {id} not found"))?;
    println!("{}", serde_json::to_string_pretty(&token)?);
    Ok(())
}

fn cmd_update(
    cli: &Cli,
    id: &str,
    name: &Option<String>,
    symbol: &Option<String>,
    amount: Option<u64>,
    creator: &Option<String>,
) -> Result<()> {
    let home = open_home(cli)?;
    let patch = TokenPatch {
        name: name.clone(),
        symbol: symbol.clone(),
        amount,
        creator: creator.clone(),
        metadata: None,
    };
    let token = home
        .store()
        .update_token(id, patch, now_unix_secs())
        .context("failed to update token")?;
    println!("updated {} ({})", token.id, token.symbol);
    Ok(())
}

fn cmd_delete(cli: &Cli, id: &str) -> Result<()> {
    let home = open_home(cli)?;
    home.store()
        .delete_token(id)
        .context("failed to delete token")?;
    println!("deleted {id}");
    Ok(())
}

fn cmd_balance(cli: &Cli, user: &str, symbol: &str) -> Result<()> {
    let home = open_home(cli)?;
    println!("{}", home.store().balance(user, symbol)?);
    Ok(())
}

fn cmd_spend(cli: &Cli, user: &str, symbol: &str, amount: u64) -> Result<()> {
    let home = open_home(cli)?;
    let remaining = home
        .store()
        .spend(user, symbol, amount, now_unix_secs())
        .context("spend failed")?;
    println!("{remaining}");
    Ok(())
}

fn cmd_transfer(cli: &Cli, from: &str, to: &str, symbol: &str, amount: u64) -> Result<()> {
    let home = open_home(cli)?;
    home.store()
        .transfer(from, to, symbol, amount, now_unix_secs())
        .context("transfer failed")?;
    println!("transferred {amount} {symbol}: {from} -> {to}");
    Ok(())
}

fn cmd_sweep(cli: &Cli) -> Result<()> {
    let home = open_home(cli)?;
    let mut rng = SmallRng::from_os_rng();
    let report = home
        .store()
        .sweep(&home.policy(), now_unix_secs(), &mut rng)
        .context("sweep failed")?;

    println!(
        "{} redistributed, {} warned",
        report.redistributed.len(),
        report.warned.len()
    );
    for r in &report.redistributed {
        println!("  {} ({}): {} -> {}", r.token_id, r.token_symbol, r.from_owner, r.to_owner);
    }
    for (id, days_left) in &report.warned {
        println!("  {id}: {days_left} day(s) until redistribution");
    }
    Ok(())
}

fn cmd_link_issue(cli: &Cli, email: &str) -> Result<()> {
    let home = open_home(cli)?;
    let ttl = home.config().link_ttl_secs;
    let link = home
        .store()
        .issue_link(email, now_unix_secs(), ttl)
        .context("failed to issue link")?;
    tracing::info!(email, expires_at = link.expires_at, "link issued");
    println!("{}", link.token);
    Ok(())
}

fn cmd_link_verify(cli: &Cli, token: &str) -> Result<()> {
    let home = open_home(cli)?;
    let link = home
        .store()
        .verify_link(token, now_unix_secs())
        .context("verification failed")?;
    println!("verified {}", link.email);
    Ok(())
}

fn cmd_ticker(cli: &Cli, symbol: &str, count: usize) -> Result<()> {
    let home = open_home(cli)?;
    let config = home.config();
    let seed = config.feed_seed.unwrap_or_else(|| seed_for_symbol(symbol));
    let mut feed = MarketFeed::from_seed(seed, config.base_price);

    for _ in 0..count {
        println!("{symbol} {:.2}", feed.next_price());
    }
    Ok(())
}

fn cmd_match(key: &str, candidates: &[String]) -> Result<()> {
    for (candidate, score) in rank_matches(key, candidates) {
        println!("{candidate} {score:+.4}");
    }
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let home = open_home(cli)?;
    let store = home.store();

    println!("ledger:          {}", home.ledger_id());
    println!("tokens:          {}", store.list_tokens()?.len());
    println!("sessions:        {}", store.list_sessions()?.len());
    println!("transfers:       {}", store.list_transfers()?.len());
    println!("redistributions: {}", store.list_redistributions()?.len());
    println!("magic links:     {}", store.list_links()?.len());
    Ok(())
}

fn cmd_export(cli: &Cli, path: &std::path::Path) -> Result<()> {
    let home = open_home(cli)?;
    home.store()
        .export_json_file(path)
        .context("export failed")?;
    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &std::path::Path) -> Result<()> {
    let home = open_home(cli)?;
    home.store()
        .import_json_file(path)
        .context("import failed")?;
    println!("imported from {}", path.display());
    cmd_stats(cli)
}

/// Foreground loop: one sweep timer, one price timer, one bus drain, one
/// shutdown path.
async fn cmd_watch(
    cli: &Cli,
    sweep_secs: u64,
    symbol: Option<&str>,
    tick_secs: u64,
) -> Result<()> {
    let home = open_home(cli)?;
    let policy = home.policy();
    let mut rng = SmallRng::from_os_rng();
    let mut events = home.store().subscribe();

    let mut feed = symbol.map(|s| {
        let seed = home.config().feed_seed.unwrap_or_else(|| seed_for_symbol(s));
        (s.to_string(), MarketFeed::from_seed(seed, home.config().base_price))
    });

    let mut sweep_timer = tokio::time::interval(Duration::from_secs(sweep_secs.max(1)));
    let mut price_timer = tokio::time::interval(Duration::from_secs(tick_secs.max(1)));

    tracing::info!(ledger = home.ledger_id(), sweep_secs, "watch started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            _ = sweep_timer.tick() => {
                match home.store().sweep(&policy, now_unix_secs(), &mut rng) {
                    Ok(report) => {
                        if !report.redistributed.is_empty() || !report.warned.is_empty() {
                            println!(
                                "sweep: {} redistributed, {} warned",
                                report.redistributed.len(),
                                report.warned.len()
                            );
                        }
                    }
                    Err(e) => tracing::error!("sweep failed: {e}"),
                }
            }
            _ = price_timer.tick() => {
                if let Some((symbol, feed)) = feed.as_mut() {
                    println!("{symbol} {:.2}", feed.next_price());
                }
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    tracing::info!(topic = event.topic(), "event");
                }
            }
        }
    }
    Ok(())
}
