//! Schedule reconciliation: one live tokio task per enabled trigger.
//!
//! The registry of live jobs is owned exclusively by [`ChimeScheduler`];
//! callers reconcile through [`rebuild`](ChimeScheduler::rebuild) and
//! [`stop`](ChimeScheduler::stop) and can only observe counts and spec
//! snapshots. A rebuild always stops the guild's entire job set before
//! starting the new one, so a stale job can never outlive the trigger it
//! was derived from.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ChimeError;
use crate::executor::{ChimeAction, TriggerExecutor};
use crate::types::{GuildConfig, GuildId, TriggerEntry};

/// Snapshot describing one live job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// 1-based trigger index at rebuild time.
    pub index: usize,
    /// Raw recurrence expression.
    pub cron: String,
    /// Action closed over at rebuild time.
    pub action: ChimeAction,
}

struct TriggerJob {
    id: Uuid,
    spec: JobSpec,
    handle: JoinHandle<()>,
}

/// Owns every live trigger job, keyed by guild.
pub struct ChimeScheduler {
    executor: Arc<TriggerExecutor>,
    default_tz: Tz,
    jobs: Mutex<HashMap<GuildId, Vec<TriggerJob>>>,
}

impl ChimeScheduler {
    pub fn new(executor: Arc<TriggerExecutor>, default_tz: Tz) -> Self {
        Self {
            executor,
            default_tz,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Stop every live job for `guild`, then start one job per enabled
    /// trigger in `cfg`. Entries with an invalid recurrence or timezone are
    /// skipped with a warning. Returns the number of live jobs.
    ///
    /// Idempotent: rebuilding twice from the same config yields an
    /// equivalent job set.
    pub fn rebuild(&self, guild: &GuildId, cfg: &GuildConfig) -> usize {
        let mut resolved = Vec::new();
        for (i, trigger) in cfg.triggers.iter().enumerate() {
            let index = i + 1;
            if !trigger.enabled {
                debug!("guild {guild}: trigger {index} is disabled, no job");
                continue;
            }
            match self.resolve(guild, cfg, index, trigger) {
                Ok(pair) => resolved.push(pair),
                Err(error) => warn!("guild {guild}: skipping trigger {index}: {error}"),
            }
        }

        // Swap under one lock so observers never see old and new jobs mixed.
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = jobs.remove(guild) {
            for job in &old {
                job.handle.abort();
            }
            debug!("guild {guild}: stopped {} job(s) for rebuild", old.len());
        }

        let mut live = Vec::with_capacity(resolved.len());
        for (spec, schedule) in resolved {
            let id = Uuid::new_v4();
            let handle = tokio::spawn(run_job(id, spec.clone(), schedule, Arc::clone(&self.executor)));
            debug!(
                "guild {guild}: job {id} live for trigger {} ({})",
                spec.index, spec.cron
            );
            live.push(TriggerJob { id, spec, handle });
        }

        let count = live.len();
        if count > 0 {
            jobs.insert(guild.clone(), live);
        }
        count
    }

    fn resolve(
        &self,
        guild: &GuildId,
        cfg: &GuildConfig,
        index: usize,
        trigger: &TriggerEntry,
    ) -> Result<(JobSpec, Schedule), ChimeError> {
        let schedule = Schedule::from_str(&trigger.cron).map_err(|e| ChimeError::InvalidCron {
            expr: trigger.cron.clone(),
            reason: e.to_string(),
        })?;
        let action = ChimeAction::resolve(guild, cfg, Some(trigger), self.default_tz)?;
        Ok((
            JobSpec {
                index,
                cron: trigger.cron.clone(),
                action,
            },
            schedule,
        ))
    }

    /// Abort and drop all of one guild's jobs. Returns how many were live.
    pub fn stop(&self, guild: &GuildId) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        match jobs.remove(guild) {
            Some(old) => {
                for job in &old {
                    job.handle.abort();
                    debug!("guild {guild}: job {} stopped", job.id);
                }
                old.len()
            }
            None => 0,
        }
    }

    /// Abort every job for every guild.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut stopped = 0;
        for (_, guild_jobs) in jobs.drain() {
            for job in &guild_jobs {
                job.handle.abort();
                stopped += 1;
            }
        }
        if stopped > 0 {
            debug!("stopped {stopped} trigger job(s)");
        }
    }

    /// Number of live jobs for `guild`.
    pub fn job_count(&self, guild: &GuildId) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(guild)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Spec snapshots of `guild`'s live jobs, in trigger order.
    pub fn job_specs(&self, guild: &GuildId) -> Vec<JobSpec> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(guild)
            .map(|jobs| jobs.iter().map(|job| job.spec.clone()).collect())
            .unwrap_or_default()
    }

    /// Total live jobs across all guilds.
    pub fn total_jobs(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl Drop for ChimeScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sleep until the next occurrence in the job's timezone, fire, repeat.
/// Occurrence iteration is exclusive of `now`, so a fire is never doubled
/// and DST gaps resolve to the next real instant.
async fn run_job(id: Uuid, spec: JobSpec, schedule: Schedule, executor: Arc<TriggerExecutor>) {
    loop {
        let now = Utc::now().with_timezone(&spec.action.timezone);
        let Some(next) = schedule.after(&now).next() else {
            debug!("job {id}: no future occurrence for '{}', stopping", spec.cron);
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;
        debug!(
            "job {id}: firing trigger {} for guild {}",
            spec.index, spec.action.guild
        );
        executor.fire(&spec.action).await;
    }
}
