use std::{
    collections::HashMap,
    sync::Mutex as StdMutex,
    time::Duration,
};

use futures_util::future::join_all;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tokio::{
    sync::{Mutex as AsyncMutex, watch},
    time::sleep,
};

use corplink_core::{
    Clock, CredentialRecord, DiscordId, LinkEvent, LinkEventKind, NotificationSink, SystemClock,
};
use corplink_sso::{AffiliationClient, SsoClient};
use corplink_store::{CredentialStore, StoreError};

use crate::{LinkError, affiliation::resolve_affiliation};

#[derive(Clone, Debug)]
pub struct RefreshCycleConfig {
    pub interval: Duration,
    pub horizon: Duration,
    pub jitter_factor: f32,
}

impl Default for RefreshCycleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3_600),
            horizon: Duration::from_secs(3_600),
            jitter_factor: 0.1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub refreshed: Vec<CredentialRecord>,
    pub needs_reauth: Vec<DiscordId>,
    pub store_failures: Vec<(DiscordId, String)>,
}

enum RecordOutcome {
    Refreshed(CredentialRecord),
    NeedsReauth {
        discord_id: DiscordId,
        rejected_token: String,
    },
    StoreFailed {
        discord_id: DiscordId,
        error: StoreError,
    },
}

pub struct RefreshSweeper<C, A, S, N, T = SystemClock>
where
    C: SsoClient + Send + Sync,
    A: AffiliationClient + Send + Sync,
    S: CredentialStore + Send + Sync,
    N: NotificationSink + Send + Sync,
    T: Clock + Send + Sync,
{
    sso: C,
    affiliation: A,
    store: S,
    notifier: N,
    clock: T,
    config: RefreshCycleConfig,
    // single-slot guard: a refresh token is single-use, so two sweeps must
    // never race over the same horizon query
    sweep_guard: AsyncMutex<()>,
    // rejected refresh tokens by discord id; a matching record is skipped
    // until a fresh callback rotates its tokens
    recent_failures: StdMutex<HashMap<DiscordId, String>>,
}

impl<C, A, S, N> RefreshSweeper<C, A, S, N, SystemClock>
where
    C: SsoClient + Send + Sync,
    A: AffiliationClient + Send + Sync,
    S: CredentialStore + Send + Sync,
    N: NotificationSink + Send + Sync,
    <N as NotificationSink>::Error: std::fmt::Display,
{
    pub fn new(sso: C, affiliation: A, store: S, notifier: N, config: RefreshCycleConfig) -> Self {
        Self::with_clock(sso, affiliation, store, notifier, config, SystemClock)
    }
}

impl<C, A, S, N, T> RefreshSweeper<C, A, S, N, T>
where
    C: SsoClient + Send + Sync,
    A: AffiliationClient + Send + Sync,
    S: CredentialStore + Send + Sync,
    N: NotificationSink + Send + Sync,
    <N as NotificationSink>::Error: std::fmt::Display,
    T: Clock + Send + Sync,
{
    pub fn with_clock(
        sso: C,
        affiliation: A,
        store: S,
        notifier: N,
        config: RefreshCycleConfig,
        clock: T,
    ) -> Self {
        Self {
            sso,
            affiliation,
            store,
            notifier,
            clock,
            config,
            sweep_guard: AsyncMutex::new(()),
            recent_failures: StdMutex::new(HashMap::new()),
        }
    }

    /// Ids whose last refresh attempt was rejected, with the refresh token
    /// that was rejected. Feeds the status report.
    pub fn recent_failures(&self) -> HashMap<DiscordId, String> {
        self.recent_failures
            .lock()
            .expect("failure map lock")
            .clone()
    }

    pub async fn run_until_shutdown(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut rng = SmallRng::from_entropy();
        log::debug!(
            "refresh sweeper starting (interval {:?}, horizon {:?})",
            self.config.interval,
            self.config.horizon
        );

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            match self.try_sweep().await {
                Ok(Some(report)) => {
                    log::info!(
                        "refresh sweep done: {} refreshed, {} need reauth, {} store failures",
                        report.refreshed.len(),
                        report.needs_reauth.len(),
                        report.store_failures.len()
                    );
                }
                Ok(None) => {
                    log::warn!("refresh sweep skipped: previous sweep still in flight");
                }
                Err(err) => {
                    log::error!("refresh sweep failed: {err}");
                }
            }

            let wait = jittered(self.config.interval, self.config.jitter_factor, &mut rng);
            tokio::select! {
                _ = sleep(wait) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// One sweep over everything expiring inside the horizon. Returns `None`
    /// when a sweep is already in flight.
    pub async fn try_sweep(&self) -> Result<Option<SweepReport>, LinkError> {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            return Ok(None);
        };

        let now = self.clock.now();
        let due = self
            .store
            .list_expiring_within(now, self.config.horizon)
            .await?;

        let attempts: Vec<CredentialRecord> = due
            .into_iter()
            .filter(|record| {
                if self.failure_matches(record) {
                    log::debug!(
                        "skipping {}: refresh token already rejected, waiting for re-authorization",
                        record.discord_id
                    );
                    false
                } else {
                    true
                }
            })
            .collect();

        if attempts.is_empty() {
            return Ok(Some(SweepReport::default()));
        }

        log::debug!("refresh sweep attempting {} records", attempts.len());

        let outcomes = join_all(
            attempts
                .into_iter()
                .map(|record| self.refresh_one(record)),
        )
        .await;

        let mut report = SweepReport::default();
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Refreshed(record) => {
                    self.clear_failure(&record.discord_id);
                    report.refreshed.push(record);
                }
                RecordOutcome::NeedsReauth {
                    discord_id,
                    rejected_token,
                } => {
                    self.mark_failure(&discord_id, rejected_token);
                    self.notify_reauth(&discord_id).await;
                    report.needs_reauth.push(discord_id);
                }
                RecordOutcome::StoreFailed { discord_id, error } => {
                    log::error!("refreshed tokens for {discord_id} could not be stored: {error}");
                    report.store_failures.push((discord_id, error.to_string()));
                }
            }
        }

        Ok(Some(report))
    }

    async fn refresh_one(&self, record: CredentialRecord) -> RecordOutcome {
        let grant = match self.sso.exchange_refresh(&record.refresh_token).await {
            Ok(grant) => grant,
            Err(err) => {
                // leave the stored pair untouched so nothing half-updated
                // survives a failed attempt
                log::warn!(
                    "refresh rejected for {} (character {}): {err}",
                    record.discord_id,
                    record.character_id
                );
                return RecordOutcome::NeedsReauth {
                    discord_id: record.discord_id,
                    rejected_token: record.refresh_token,
                };
            }
        };

        let now = self.clock.now();

        let character_name = match self.sso.verify(&grant.access_token).await {
            Ok(verified) => verified.character_name,
            Err(err) => {
                log::warn!(
                    "verification after refresh failed for {}: {err}; keeping stored name",
                    record.discord_id
                );
                record.character_name.clone()
            }
        };

        let resolved = resolve_affiliation(&self.affiliation, record.character_id).await;
        let affiliation = if resolved.is_resolved() {
            resolved
        } else {
            // new tokens still win; the stale affiliation beats none at all
            record.affiliation.clone()
        };

        let updated = CredentialRecord {
            discord_id: record.discord_id.clone(),
            discord_name: record.discord_name.clone(),
            character_id: record.character_id,
            character_name,
            affiliation,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_expires_at: now.saturating_add(grant.expires_in),
            last_synced_at: now,
            created_at: record.created_at,
        };

        match self.store.upsert(&updated).await {
            Ok(()) => RecordOutcome::Refreshed(updated),
            Err(error) => RecordOutcome::StoreFailed {
                discord_id: updated.discord_id.clone(),
                error,
            },
        }
    }

    async fn notify_reauth(&self, discord_id: &DiscordId) {
        let event = LinkEvent {
            discord_id: discord_id.clone(),
            kind: LinkEventKind::ReauthRequired,
        };
        if let Err(err) = self.notifier.notify(event).await {
            log::warn!("reauth notification for {discord_id} failed: {err}");
        }
    }

    fn failure_matches(&self, record: &CredentialRecord) -> bool {
        self.recent_failures
            .lock()
            .expect("failure map lock")
            .get(&record.discord_id)
            .is_some_and(|token| *token == record.refresh_token)
    }

    fn mark_failure(&self, discord_id: &DiscordId, rejected_token: String) {
        self.recent_failures
            .lock()
            .expect("failure map lock")
            .insert(discord_id.clone(), rejected_token);
    }

    fn clear_failure(&self, discord_id: &DiscordId) {
        self.recent_failures
            .lock()
            .expect("failure map lock")
            .remove(discord_id);
    }
}

fn jittered(base: Duration, jitter_factor: f32, rng: &mut SmallRng) -> Duration {
    let jitter_factor = f64::from(jitter_factor.clamp(0.0, 1.0));
    if jitter_factor <= 0.0 {
        return base;
    }

    let multiplier = rng.gen_range((1.0 - jitter_factor)..=(1.0 + jitter_factor));
    base.mul_f64(multiplier)
}
