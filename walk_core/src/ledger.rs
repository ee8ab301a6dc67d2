//! Profile ledger.
//!
//! Credit events from a tracking session are applied to the user's lifetime
//! profile (coin balance, distance, level) and recorded as coin transactions:
//! one `walk` entry per credit, plus `referral_bonus` and `level_up` entries
//! when those parts of the event are non-zero.
//!
//! Several processes may credit the same profile at once. [`FileLedger`]
//! reloads the profile under its [`StateLock`] before every write, and a
//! level-up bonus is paid only if the stored profile has not reached that
//! level yet, so two sessions that both saw the same crossing pay it once.

use crate::journal::{append_jsonl, read_jsonl};
use crate::state::StateLock;
use crate::{state, CoinTransaction, Profile, Result, RewardCreditEvent, TransactionKind};
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

impl Profile {
    /// Load a profile, defaulting when missing or unreadable
    pub fn load(path: &Path) -> Result<Self> {
        Ok(state::load_json::<Profile>(path, "profile")?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        state::save_json(self, path)
    }

    /// The credit this profile should actually receive.
    ///
    /// Drops a level-up the profile already has; base and referral amounts are
    /// kept as reported.
    pub fn reconcile(&self, event: &RewardCreditEvent) -> RewardCreditEvent {
        let mut event = event.clone();
        if let (true, Some(level)) = (event.level_up_triggered, event.new_level) {
            if level <= self.current_level {
                tracing::info!(
                    "Level {} already reached, skipping duplicate bonus",
                    level
                );
                event.level_up_triggered = false;
                event.new_level = None;
                event.level_bonus_units = 0;
            }
        }
        event
    }

    /// Fold a credit event into the lifetime totals
    pub fn apply_credit(&mut self, event: &RewardCreditEvent) {
        self.total_coins += event.total_units();
        self.total_distance_km += event.distance_km;
        if let Some(level) = event.new_level {
            self.current_level = self.current_level.max(level);
        }
    }
}

/// Transactions describing one credit event
pub fn transactions_for(event: &RewardCreditEvent, referral_count: u32) -> Vec<CoinTransaction> {
    let created_at = Utc::now();
    let mut transactions = Vec::with_capacity(3);

    if event.base_units > 0 {
        transactions.push(CoinTransaction {
            id: Uuid::new_v4(),
            amount: event.base_units,
            kind: TransactionKind::Walk,
            description: format!("Walk: {:.2} km", event.distance_km),
            created_at,
        });
    }
    if event.referral_bonus_units > 0 {
        transactions.push(CoinTransaction {
            id: Uuid::new_v4(),
            amount: event.referral_bonus_units,
            kind: TransactionKind::ReferralBonus,
            description: format!("Referral bonus ({} referrals)", referral_count),
            created_at,
        });
    }
    if let (true, Some(level)) = (event.level_up_triggered, event.new_level) {
        transactions.push(CoinTransaction {
            id: Uuid::new_v4(),
            amount: event.level_bonus_units,
            kind: TransactionKind::LevelUp,
            description: format!("Level up! Reached level {}", level),
            created_at,
        });
    }

    transactions
}

/// Receives reward credits for the current user
pub trait ProfileLedger {
    /// Current lifetime totals
    fn profile(&self) -> &Profile;

    /// Record a credit event; returns the transactions written
    fn apply(&mut self, event: &RewardCreditEvent) -> Result<Vec<CoinTransaction>>;
}

/// Ledger kept in memory, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryLedger {
    profile: Profile,
    transactions: Vec<CoinTransaction>,
}

impl MemoryLedger {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            transactions: Vec::new(),
        }
    }

    pub fn transactions(&self) -> &[CoinTransaction] {
        &self.transactions
    }
}

impl ProfileLedger for MemoryLedger {
    fn profile(&self) -> &Profile {
        &self.profile
    }

    fn apply(&mut self, event: &RewardCreditEvent) -> Result<Vec<CoinTransaction>> {
        let event = self.profile.reconcile(event);
        let transactions = transactions_for(&event, self.profile.referral_count);
        self.profile.apply_credit(&event);
        self.transactions.extend(transactions.iter().cloned());
        Ok(transactions)
    }
}

/// Ledger persisted as `profile.json` plus an append-only `transactions.jsonl`
pub struct FileLedger {
    profile_path: PathBuf,
    transactions_path: PathBuf,
    profile: Profile,
}

impl FileLedger {
    pub fn open(profile_path: impl Into<PathBuf>, transactions_path: impl Into<PathBuf>) -> Result<Self> {
        let profile_path = profile_path.into();
        let profile = Profile::load(&profile_path)?;
        Ok(Self {
            profile_path,
            transactions_path: transactions_path.into(),
            profile,
        })
    }

    /// Persist a new referral count, which scales future referral bonuses
    pub fn set_referral_count(&mut self, count: u32) -> Result<()> {
        let _lock = StateLock::acquire(&self.profile_path)?;
        let mut profile = Profile::load(&self.profile_path)?;
        profile.referral_count = count;
        profile.save(&self.profile_path)?;
        self.profile = profile;
        Ok(())
    }

    pub fn transactions(&self) -> Result<Vec<CoinTransaction>> {
        read_transactions(&self.transactions_path)
    }
}

impl ProfileLedger for FileLedger {
    fn profile(&self) -> &Profile {
        &self.profile
    }

    fn apply(&mut self, event: &RewardCreditEvent) -> Result<Vec<CoinTransaction>> {
        // Held until the transactions are appended
        let _lock = StateLock::acquire(&self.profile_path)?;

        let mut updated = Profile::load(&self.profile_path)?;
        let event = updated.reconcile(event);
        let transactions = transactions_for(&event, updated.referral_count);

        updated.apply_credit(&event);
        updated.save(&self.profile_path)?;
        self.profile = updated;

        append_jsonl(&self.transactions_path, &transactions)?;
        tracing::info!(
            "Credited {} coins, balance {}",
            event.total_units(),
            self.profile.total_coins
        );
        Ok(transactions)
    }
}

/// Read the transaction history, oldest first
pub fn read_transactions(path: &Path) -> Result<Vec<CoinTransaction>> {
    read_jsonl(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(base: u64, referral: u64, level: Option<u32>) -> RewardCreditEvent {
        RewardCreditEvent {
            base_units: base,
            referral_bonus_units: referral,
            level_up_triggered: level.is_some(),
            new_level: level,
            level_bonus_units: if level.is_some() { 500 } else { 0 },
            distance_km: base as f64 / 100.0,
        }
    }

    #[test]
    fn test_transactions_for_plain_walk() {
        let transactions = transactions_for(&credit(10, 0, None), 0);
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].kind, TransactionKind::Walk);
        assert_eq!(transactions[0].amount, 10);
        assert_eq!(transactions[0].description, "Walk: 0.10 km");
    }

    #[test]
    fn test_transactions_for_full_event() {
        let transactions = transactions_for(&credit(10, 20, Some(2)), 2);
        let kinds: Vec<_> = transactions.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionKind::Walk,
                TransactionKind::ReferralBonus,
                TransactionKind::LevelUp
            ]
        );
        assert_eq!(transactions[2].amount, 500);
        assert_eq!(transactions[2].description, "Level up! Reached level 2");
    }

    #[test]
    fn test_memory_ledger_accumulates() {
        let mut ledger = MemoryLedger::default();
        ledger.apply(&credit(50, 0, None)).unwrap();
        ledger.apply(&credit(50, 0, Some(2))).unwrap();

        let profile = ledger.profile();
        assert_eq!(profile.total_coins, 600);
        assert!((profile.total_distance_km - 1.0).abs() < 1e-12);
        assert_eq!(profile.current_level, 2);
        assert_eq!(ledger.transactions().len(), 3);
    }

    #[test]
    fn test_file_ledger_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let profile_path = temp_dir.path().join("profile.json");
        let transactions_path = temp_dir.path().join("transactions.jsonl");

        {
            let mut ledger = FileLedger::open(&profile_path, &transactions_path).unwrap();
            ledger.set_referral_count(1).unwrap();
            ledger.apply(&credit(30, 30, None)).unwrap();
        }

        let ledger = FileLedger::open(&profile_path, &transactions_path).unwrap();
        assert_eq!(ledger.profile().total_coins, 60);
        assert_eq!(ledger.profile().referral_count, 1);
        assert!((ledger.profile().total_distance_km - 0.3).abs() < 1e-12);

        let transactions = ledger.transactions().unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[1].description, "Referral bonus (1 referrals)");
    }

    #[test]
    fn test_concurrent_file_ledgers_keep_every_credit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let profile_path = temp_dir.path().join("profile.json");
        let transactions_path = temp_dir.path().join("transactions.jsonl");

        // Every ledger opens before any credit lands, so each cached profile is stale
        let ledgers: Vec<_> = (0..8)
            .map(|_| FileLedger::open(&profile_path, &transactions_path).unwrap())
            .collect();
        let handles: Vec<_> = ledgers
            .into_iter()
            .map(|mut ledger| {
                std::thread::spawn(move || {
                    ledger.apply(&credit(10, 0, None)).unwrap();
                    ledger.apply(&credit(10, 0, None)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let profile = Profile::load(&profile_path).unwrap();
        assert_eq!(profile.total_coins, 8 * 20);
        assert!((profile.total_distance_km - 1.6).abs() < 1e-9);
        assert_eq!(read_transactions(&transactions_path).unwrap().len(), 16);
    }

    #[test]
    fn test_stale_ledgers_pay_level_bonus_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let profile_path = temp_dir.path().join("profile.json");
        let transactions_path = temp_dir.path().join("transactions.jsonl");

        let mut first = FileLedger::open(&profile_path, &transactions_path).unwrap();
        let mut second = FileLedger::open(&profile_path, &transactions_path).unwrap();
        first.apply(&credit(10, 0, Some(2))).unwrap();
        let written = second.apply(&credit(10, 0, Some(2))).unwrap();

        assert_eq!(written.len(), 1);
        assert_eq!(written[0].kind, TransactionKind::Walk);
        assert_eq!(second.profile().total_coins, 520);
        assert_eq!(second.profile().current_level, 2);

        let level_ups = read_transactions(&transactions_path)
            .unwrap()
            .iter()
            .filter(|t| t.kind == TransactionKind::LevelUp)
            .count();
        assert_eq!(level_ups, 1);
    }

    #[test]
    fn test_referral_count_survives_concurrent_credit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let profile_path = temp_dir.path().join("profile.json");
        let transactions_path = temp_dir.path().join("transactions.jsonl");

        let mut crediting = FileLedger::open(&profile_path, &transactions_path).unwrap();
        let mut referring = FileLedger::open(&profile_path, &transactions_path).unwrap();
        crediting.apply(&credit(10, 0, None)).unwrap();
        referring.set_referral_count(3).unwrap();

        let profile = Profile::load(&profile_path).unwrap();
        assert_eq!(profile.total_coins, 10);
        assert_eq!(profile.referral_count, 3);
    }

    #[test]
    fn test_corrupted_profile_loads_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let profile_path = temp_dir.path().join("profile.json");
        std::fs::write(&profile_path, "not a profile").unwrap();

        let profile = Profile::load(&profile_path).unwrap();
        assert_eq!(profile.current_level, 1);
        assert_eq!(profile.total_coins, 0);
    }
}
