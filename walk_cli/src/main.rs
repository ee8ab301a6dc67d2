use clap::{Parser, Subcommand, ValueEnum};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walk_core::feedback::LogDevice;
use walk_core::*;

#[derive(Parser)]
#[command(name = "walkcoin")]
#[command(about = "Step counting, distance tracking and walk rewards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded sensor trace through a tracking session
    Track {
        /// JSONL file with one tracking event per line
        #[arg(long)]
        trace: PathBuf,

        /// Set the referral count before tracking
        #[arg(long)]
        referrals: Option<u32>,

        /// Dry run - show the session without crediting or journaling it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show or change step settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show coin balance, level and recent transactions
    Ledger {
        /// Number of transactions to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show per-day walking totals
    Stats {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Roll up journaled sessions to CSV
    Rollup {
        /// Clean up processed journal files after rollup
        #[arg(long)]
        cleanup: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        /// Body height in cm; the stride is derived from it
        #[arg(long)]
        height: Option<f64>,

        /// Stride length in metres, overriding the derived value
        #[arg(long)]
        stride: Option<f64>,

        #[arg(long, value_enum)]
        vibration: Option<Toggle>,

        #[arg(long, value_enum)]
        sound: Option<Toggle>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

struct DataPaths {
    settings: PathBuf,
    profile: PathBuf,
    transactions: PathBuf,
    wal_dir: PathBuf,
    journal: PathBuf,
    csv: PathBuf,
}

impl DataPaths {
    fn new(data_dir: &Path) -> Self {
        let wal_dir = data_dir.join("wal");
        Self {
            settings: data_dir.join("settings.json"),
            profile: data_dir.join("profile.json"),
            transactions: data_dir.join("transactions.jsonl"),
            journal: wal_dir.join("sessions.wal"),
            wal_dir,
            csv: data_dir.join("sessions.csv"),
        }
    }
}

fn main() -> Result<()> {
    walk_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let paths = DataPaths::new(&data_dir);

    match cli.command {
        Commands::Track {
            trace,
            referrals,
            dry_run,
        } => cmd_track(&paths, config, &trace, referrals, dry_run),
        Commands::Settings { action } => cmd_settings(&paths, action),
        Commands::Ledger { limit } => cmd_ledger(&paths, limit),
        Commands::Stats { days } => cmd_stats(&paths, days),
        Commands::Rollup { cleanup } => cmd_rollup(&paths, cleanup),
    }
}

/// Parse a trace file, skipping lines that are not tracking events
fn read_trace(path: &Path) -> Result<Vec<TrackingEvent>> {
    let file = std::fs::File::open(path)?;
    let mut events = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<TrackingEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!("Skipping trace line {}: {}", line_num + 1, e),
        }
    }
    Ok(events)
}

fn cmd_track(
    paths: &DataPaths,
    config: Config,
    trace: &Path,
    referrals: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    let events = read_trace(trace)?;
    if events.is_empty() {
        return Err(Error::Other(format!("no tracking events in {:?}", trace)));
    }
    let settings = StepSettings::load(&paths.settings)?;

    if dry_run {
        let mut profile = Profile::load(&paths.profile)?;
        if let Some(count) = referrals {
            profile.referral_count = count;
        }
        let tracker = Tracker::new(config, settings, MemoryLedger::new(profile), LogDevice);
        replay(tracker, &events, None)?;
        println!("(dry run, nothing recorded)");
    } else {
        let mut ledger = FileLedger::open(&paths.profile, &paths.transactions)?;
        if let Some(count) = referrals {
            ledger.set_referral_count(count)?;
        }
        let tracker = Tracker::new(config, settings, ledger, LogDevice);
        let mut journal = JsonlSink::new(&paths.journal);
        replay(tracker, &events, Some(&mut journal))?;
        println!("✓ Session recorded");
    }

    Ok(())
}

/// Run events through a session and print what it produced
fn replay<L: ProfileLedger>(
    mut tracker: Tracker<L, LogDevice>,
    events: &[TrackingEvent],
    journal: Option<&mut JsonlSink>,
) -> Result<()> {
    let start_ms = events.iter().map(|e| e.timestamp_ms()).min().unwrap_or(0);
    let end_ms = events
        .iter()
        .map(|e| e.timestamp_ms())
        .max()
        .unwrap_or(start_ms);

    tracker.start(start_ms);
    let mut credits = 0;
    for event in events {
        for output in tracker.handle(event)? {
            match output {
                SessionOutput::Credit(credit) => {
                    credits += 1;
                    if let Some(level) = credit.new_level {
                        println!("★ Level up! Reached level {}", level);
                    }
                }
                SessionOutput::Notice(notice) => println!("! {}", notice),
                SessionOutput::Steps { .. } | SessionOutput::TierChanged { .. } => {}
            }
        }
    }

    let snapshot = tracker.snapshot();
    let Some(mut summary) = tracker.stop(end_ms) else {
        return Err(Error::Tracker("session was not running".into()));
    };

    // Trace clocks are arbitrary; anchor the session so it ends now
    let elapsed = summary.ended_at - summary.started_at;
    summary.ended_at = chrono::Utc::now();
    summary.started_at = summary.ended_at - elapsed;

    println!("Session summary");
    println!(
        "  Steps:     {} ({} accelerometer, {} estimated)",
        snapshot.steps, snapshot.accelerometer_steps, snapshot.estimated_steps
    );
    println!("  Distance:  {:.2} km", snapshot.distance_km);
    println!("  Coins:     {} ({} credits)", summary.coins, credits);
    println!("  Tier:      {}", summary.final_tier);

    let profile = tracker.ledger().profile();
    println!(
        "  Balance:   {} coins, level {}",
        profile.total_coins, profile.current_level
    );

    if let Some(journal) = journal {
        journal.append(&summary)?;
    }
    Ok(())
}

fn print_settings(settings: &StepSettings) {
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };
    println!("Height:    {} cm", settings.height_cm);
    println!("Stride:    {:.3} m", settings.stride_length_m);
    println!("Vibration: {}", on_off(settings.vibration_enabled));
    println!("Sound:     {}", on_off(settings.sound_enabled));
}

fn cmd_settings(paths: &DataPaths, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = StepSettings::load(&paths.settings)?;
            print_settings(&settings);
        }
        SettingsAction::Set {
            height,
            stride,
            vibration,
            sound,
        } => {
            let settings = StepSettings::update(&paths.settings, |s| {
                if let Some(height) = height {
                    s.set_height(height);
                }
                if let Some(stride) = stride {
                    s.stride_length_m = stride;
                }
                if let Some(vibration) = vibration {
                    s.vibration_enabled = vibration.enabled();
                }
                if let Some(sound) = sound {
                    s.sound_enabled = sound.enabled();
                }
                Ok(())
            })?;
            println!("✓ Settings saved");
            print_settings(&settings);
        }
    }
    Ok(())
}

fn cmd_ledger(paths: &DataPaths, limit: usize) -> Result<()> {
    let ledger = FileLedger::open(&paths.profile, &paths.transactions)?;
    let profile = ledger.profile();
    println!("Coins:     {}", profile.total_coins);
    println!("Level:     {}", profile.current_level);
    println!("Distance:  {:.2} km", profile.total_distance_km);
    println!("Referrals: {}", profile.referral_count);

    let transactions = ledger.transactions()?;
    if transactions.is_empty() {
        println!("No transactions yet");
        return Ok(());
    }

    println!();
    println!("Recent transactions:");
    for tx in transactions.iter().rev().take(limit) {
        println!(
            "  {}  +{:<5} {}",
            tx.created_at.format("%Y-%m-%d %H:%M"),
            tx.amount,
            tx.description
        );
    }
    Ok(())
}

fn cmd_stats(paths: &DataPaths, days: u32) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let stats = daily_stats(&paths.journal, &paths.csv, today, days)?;

    if stats.is_empty() {
        println!("No walks in the last {} days", days);
        return Ok(());
    }

    for day in &stats {
        println!(
            "{}  {:>6} steps  {:>6.2} km  {:>5} coins  {} session(s)",
            day.date, day.total_steps, day.total_distance_km, day.total_coins, day.sessions_count
        );
    }
    Ok(())
}

fn cmd_rollup(paths: &DataPaths, cleanup: bool) -> Result<()> {
    let count = walk_core::rollup::journal_to_csv(&paths.journal, &paths.csv)?;
    println!("✓ Rolled up {} sessions to CSV", count);

    if cleanup {
        let cleaned = walk_core::rollup::cleanup_processed(&paths.wal_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed journal files", cleaned);
        }
    }

    Ok(())
}
