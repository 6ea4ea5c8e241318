//! Stake CLI
//!
//! Command-line host for the stake ledger. Every invocation loads the
//! snapshot, applies one command, saves, and prints the result as JSON.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stake_ledger::settings::resolve_identity;
use stake_ledger::{
    format_amount, parse_amount, AccountId, Amount, AssetRef, Clock, EventRecord,
    FileSnapshotStore, LedgerSettings, LoggingConfig, ManualClock, PositionId, RewardCalculator,
    Role, SnapshotStore, StakeLedger, SystemClock, TierConfig, ONE_TOKEN,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "stake")]
#[command(version)]
#[command(about = "Tiered value-staking ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file path
    #[arg(short, long, global = true, default_value = "stake.toml")]
    config: PathBuf,

    /// Snapshot file (overrides the settings)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Acting identity: a name or 64-char hex id (defaults to the root)
    #[arg(long = "as", global = true, value_name = "IDENTITY")]
    identity: Option<String>,

    /// Evaluate at this unix timestamp instead of the wall clock
    #[arg(long, global = true)]
    at: Option<i64>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write default settings (if absent) and create an empty ledger
    Init {
        /// Replace an existing snapshot
        #[arg(long)]
        force: bool,
    },

    /// Open a position as the acting identity
    Open {
        /// Amount in tokens, e.g. 1000 or 0.5
        #[arg(value_parser = parse_amount_arg)]
        amount: Amount,
        tier: usize,
    },

    /// Close a position and release principal plus reward
    Close { id: u64 },

    /// Claim accrued reward on a flexible position
    Claim { id: u64 },

    /// Pause a position (operator)
    Pause { id: u64 },

    /// Resume a paused position (operator)
    Resume { id: u64 },

    /// Change a tier's annual rate in basis points (operator)
    SetRate { tier: usize, rate_bps: u32 },

    /// Enable or disable a tier for new positions (operator)
    SetTierActive {
        tier: usize,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },

    /// Set min and max position amounts (administrator)
    SetLimits {
        #[arg(value_parser = parse_amount_arg)]
        min: Amount,
        #[arg(value_parser = parse_amount_arg)]
        max: Amount,
    },

    /// Set the per-participant exposure cap (administrator)
    SetCap {
        #[arg(value_parser = parse_amount_arg)]
        cap: Amount,
    },

    /// Set a tier's capacity (administrator)
    SetTierCap {
        tier: usize,
        #[arg(value_parser = parse_amount_arg)]
        cap: Amount,
    },

    /// Set the new-position rate limit (administrator)
    SetRateLimit { max_new_positions: u32, window_secs: u64 },

    /// Grant a role
    Grant { account: String, role: Role },

    /// Revoke a role
    Revoke { account: String, role: Role },

    /// Block all new positions (administrator)
    PauseSystem,

    /// Allow new positions again (administrator)
    ResumeSystem,

    /// Record an emergency withdrawal (emergency responder)
    EmergencyWithdraw {
        asset: String,
        #[arg(value_parser = parse_amount_arg)]
        amount: Amount,
    },

    /// Show one position
    Position { id: u64 },

    /// List positions of an owner
    Positions {
        owner: String,
        /// Only open positions
        #[arg(long)]
        active: bool,
    },

    /// Pending reward of a position
    Pending { id: u64 },

    /// System-wide statistics
    Stats,

    /// Per-owner statistics
    OwnerStats { owner: String },

    /// Tier catalog
    Tiers,

    /// Journal records after a sequence number
    Events {
        #[arg(long, default_value_t = 0)]
        since: u64,
    },
}

fn parse_amount_arg(s: &str) -> Result<Amount, String> {
    parse_amount(s).map_err(|e| e.to_string())
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn expand_path(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Settings file plus `STAKE__SECTION__KEY` environment overrides
fn load_settings(path: &Path) -> anyhow::Result<LedgerSettings> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .add_source(
            config::Environment::with_prefix("STAKE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("reading settings from {}", path.display()))?;
    Ok(settings.try_deserialize()?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct AmountView {
    base_units: Amount,
    tokens: String,
}

impl From<Amount> for AmountView {
    fn from(amount: Amount) -> Self {
        Self {
            base_units: amount,
            tokens: format_amount(amount),
        }
    }
}

#[derive(Serialize)]
struct Opened {
    position_id: PositionId,
    owner: AccountId,
}

#[derive(Serialize)]
struct Pending {
    position_id: PositionId,
    pending: AmountView,
}

/// Stake used for the yearly reward column of `tiers`
const PROJECTION_TOKENS: Amount = 1_000;

#[derive(Serialize)]
struct TierView {
    index: usize,
    duration_secs: u64,
    flexible: bool,
    annual_rate_bps: u32,
    active: bool,
    cap: AmountView,
    staked: AmountView,
    remaining: AmountView,
    yearly_reward_per_1000_tokens: AmountView,
}

impl TryFrom<&TierConfig> for TierView {
    type Error = stake_ledger::LedgerError;

    fn try_from(tier: &TierConfig) -> Result<Self, Self::Error> {
        let projection =
            RewardCalculator::annual_projection(PROJECTION_TOKENS * ONE_TOKEN, tier.annual_rate_bps)?;
        Ok(Self {
            index: tier.index,
            duration_secs: tier.duration_secs,
            flexible: tier.is_flexible(),
            annual_rate_bps: tier.annual_rate_bps,
            active: tier.is_active,
            cap: tier.cap_amount.into(),
            staked: tier.staked_amount.into(),
            remaining: tier.remaining_capacity().into(),
            yearly_reward_per_1000_tokens: projection.into(),
        })
    }
}

#[derive(Serialize)]
struct EventsView {
    last_sequence: u64,
    records: Vec<EventRecord>,
}

#[derive(Serialize)]
struct Changed {
    changed: bool,
}

#[derive(Serialize)]
struct Done {
    ok: bool,
}

impl Commands {
    fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Commands::Init { .. }
                | Commands::Position { .. }
                | Commands::Positions { .. }
                | Commands::Pending { .. }
                | Commands::Stats
                | Commands::OwnerStats { .. }
                | Commands::Tiers
                | Commands::Events { .. }
        )
    }
}

fn init(settings: &LedgerSettings, store: &FileSnapshotStore, config: &Path, force: bool) -> anyhow::Result<()> {
    if !config.exists() {
        std::fs::write(config, toml::to_string_pretty(settings)?)
            .with_context(|| format!("writing {}", config.display()))?;
        tracing::info!(path = %config.display(), "Default settings written");
    }
    if store.path().exists() && !force {
        bail!(
            "ledger already exists at {} (use --force to replace it)",
            store.path().display()
        );
    }

    let ledger = settings.build_ledger(Arc::new(SystemClock))?;
    store.save(&ledger.snapshot())?;
    tracing::info!(path = %store.path().display(), "Ledger initialized");
    print_json(&ledger.get_aggregate_stats())
}

fn execute(ledger: &StakeLedger, caller: AccountId, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init { .. } => bail!("init runs before a ledger is loaded"),

        Commands::Open { amount, tier } => {
            let id = ledger.open(caller, amount, tier)?;
            print_json(&Opened {
                position_id: id,
                owner: caller,
            })
        }
        Commands::Close { id } => print_json(&ledger.close(PositionId::new(id), caller)?),
        Commands::Claim { id } => {
            let claimed = ledger.claim_rewards(PositionId::new(id), caller)?;
            print_json(&AmountView::from(claimed))
        }
        Commands::Pause { id } => {
            ledger.pause(PositionId::new(id), caller)?;
            print_json(&ledger.get_position(PositionId::new(id)))
        }
        Commands::Resume { id } => {
            ledger.resume(PositionId::new(id), caller)?;
            print_json(&ledger.get_position(PositionId::new(id)))
        }
        Commands::SetRate { tier, rate_bps } => {
            ledger.set_tier_rate(tier, rate_bps, caller)?;
            print_json(&ledger.get_tier_config(tier)?)
        }
        Commands::SetTierActive { tier, active } => {
            ledger.set_tier_active(tier, active, caller)?;
            print_json(&ledger.get_tier_config(tier)?)
        }
        Commands::SetLimits { min, max } => {
            ledger.set_global_limits(min, max, caller)?;
            print_json(&ledger.limits())
        }
        Commands::SetCap { cap } => {
            ledger.set_per_participant_cap(cap, caller)?;
            print_json(&ledger.limits())
        }
        Commands::SetTierCap { tier, cap } => {
            ledger.set_tier_cap(tier, cap, caller)?;
            print_json(&ledger.get_tier_config(tier)?)
        }
        Commands::SetRateLimit {
            max_new_positions,
            window_secs,
        } => {
            ledger.set_rate_limit(max_new_positions, window_secs, caller)?;
            print_json(&ledger.limits())
        }
        Commands::Grant { account, role } => {
            let changed = ledger.grant_role(resolve_identity(&account), role, caller)?;
            print_json(&Changed { changed })
        }
        Commands::Revoke { account, role } => {
            let changed = ledger.revoke_role(resolve_identity(&account), role, caller)?;
            print_json(&Changed { changed })
        }
        Commands::PauseSystem => {
            ledger.pause_system(caller)?;
            print_json(&Done { ok: true })
        }
        Commands::ResumeSystem => {
            ledger.resume_system(caller)?;
            print_json(&Done { ok: true })
        }
        Commands::EmergencyWithdraw { asset, amount } => {
            let asset = AssetRef::new(asset);
            ledger.emergency_withdraw(asset.clone(), amount, caller)?;
            print_json(&AmountView::from(ledger.emergency_withdrawn(&asset)))
        }

        Commands::Position { id } => match ledger.get_position(PositionId::new(id)) {
            Some(position) => print_json(&position),
            None => bail!("position #{} not found", id),
        },
        Commands::Positions { owner, active } => {
            let owner = resolve_identity(&owner);
            if active {
                print_json(&ledger.get_active_positions(&owner))
            } else {
                print_json(&ledger.get_positions_by_owner(&owner))
            }
        }
        Commands::Pending { id } => {
            let id = PositionId::new(id);
            let pending = ledger.get_pending_reward(id)?;
            print_json(&Pending {
                position_id: id,
                pending: pending.into(),
            })
        }
        Commands::Stats => print_json(&ledger.get_aggregate_stats()),
        Commands::OwnerStats { owner } => {
            print_json(&ledger.get_owner_stats(&resolve_identity(&owner))?)
        }
        Commands::Tiers => {
            let tiers = ledger
                .tiers()
                .iter()
                .map(TierView::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&tiers)
        }
        Commands::Events { since } => print_json(&EventsView {
            last_sequence: ledger.last_event_sequence(),
            records: ledger.events_since(since),
        }),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&expand_path(&cli.config))?;
    init_logging(cli.verbose, &settings.logging);

    let snapshot_path = cli
        .snapshot
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.storage.snapshot_path));
    let store = FileSnapshotStore::new(expand_path(&snapshot_path));

    if let Commands::Init { force } = cli.command {
        return init(&settings, &store, &expand_path(&cli.config), force);
    }

    let clock: Arc<dyn Clock> = match cli.at {
        Some(at) => Arc::new(ManualClock::new(at)),
        None => Arc::new(SystemClock),
    };
    let snapshot = store
        .load()?
        .with_context(|| format!("no ledger at {}; run `stake init` first", store.path().display()))?;
    let ledger = StakeLedger::restore(snapshot, clock)?;

    let caller = resolve_identity(cli.identity.as_deref().unwrap_or(&settings.roles.root));
    let mutating = cli.command.is_mutating();
    execute(&ledger, caller, cli.command)?;

    if mutating {
        save(&ledger, &store, settings.storage.journal_retention)?;
    }
    Ok(())
}

/// Trim the journal to `retention` records (0 keeps all) and write the snapshot
fn save(ledger: &StakeLedger, store: &FileSnapshotStore, retention: usize) -> anyhow::Result<()> {
    if retention > 0 {
        ledger.compact_journal(retention)?;
    }
    store.save(&ledger.snapshot())?;
    Ok(())
}
