use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use contracts::usecases::u504_daily_analytics::DailyAnalyticsRequest;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::shared::config::ScheduleConfig;
use crate::usecases::u503_ingestion_sweep::IngestionSweep;
use crate::usecases::u504_daily_analytics::DailyAnalytics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    IngestionSweep,
    DailyAnalytics,
}

struct Entry {
    routine: Routine,
    schedule: Schedule,
    next_run: Option<DateTime<Utc>>,
}

/// Фоновый планировщик: calls the sweep and the rollup directly when
/// their cron expressions come due
pub struct CronScheduler {
    entries: Vec<Entry>,
    sweep: Arc<IngestionSweep>,
    analytics: Arc<DailyAnalytics>,
    tick: Duration,
}

impl CronScheduler {
    pub fn new(
        config: &ScheduleConfig,
        sweep: Arc<IngestionSweep>,
        analytics: Arc<DailyAnalytics>,
    ) -> Result<Self> {
        let now = Utc::now();
        let entries = vec![
            entry(Routine::IngestionSweep, &config.ingestion_sweep, now)?,
            entry(Routine::DailyAnalytics, &config.daily_analytics, now)?,
        ];
        Ok(Self {
            entries,
            sweep,
            analytics,
            tick: Duration::from_secs(30),
        })
    }

    pub async fn run_loop(mut self, mut shutdown: watch::Receiver<bool>) {
        for e in &self.entries {
            info!("Scheduled {:?}, next run at {:?}", e.routine, e.next_run);
        }
        let mut interval = time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            for routine in self.take_due(Utc::now()) {
                self.run_routine(routine).await;
            }
        }
        info!("Cron scheduler stopped");
    }

    /// Routines due at `now`; each one's next run moves past `now`
    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<Routine> {
        let mut due = Vec::new();
        for e in self.entries.iter_mut() {
            if matches!(e.next_run, Some(at) if at <= now) {
                due.push(e.routine);
                e.next_run = e.schedule.after(&now).next();
            }
        }
        due
    }

    async fn run_routine(&self, routine: Routine) {
        info!("Running scheduled {:?}", routine);
        let result = match routine {
            Routine::IngestionSweep => self.sweep.run().await.map(|r| format!("{:?}", r)),
            Routine::DailyAnalytics => self
                .analytics
                .run(DailyAnalyticsRequest::default())
                .await
                .map(|r| format!("{:?}", r)),
        };
        match result {
            Ok(summary) => info!("Scheduled {:?} finished: {}", routine, summary),
            Err(e) => error!("Scheduled {:?} failed: {:?}", routine, e),
        }
    }
}

fn entry(routine: Routine, expression: &str, now: DateTime<Utc>) -> Result<Entry> {
    let schedule = Schedule::from_str(expression)
        .with_context(|| format!("invalid cron expression for {:?}: '{}'", routine, expression))?;
    let next_run = schedule.after(&now).next();
    Ok(Entry {
        routine,
        schedule,
        next_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use crate::system::ingestion::JobQueue;
    use chrono::TimeZone;

    async fn scheduler(config: &ScheduleConfig) -> Result<CronScheduler> {
        let db = connect_in_memory().await;
        let queue = Arc::new(JobQueue::new(db.clone(), Duration::from_secs(600)));
        CronScheduler::new(
            config,
            Arc::new(IngestionSweep::new(db.clone(), queue)),
            Arc::new(DailyAnalytics::new(db)),
        )
    }

    #[tokio::test]
    async fn test_invalid_expression_is_rejected() {
        let config = ScheduleConfig {
            enabled: true,
            ingestion_sweep: "every day please".into(),
            daily_analytics: "0 30 4 * * *".into(),
        };
        assert!(scheduler(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_take_due_advances_next_run() {
        let mut s = scheduler(&ScheduleConfig::default()).await.unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for e in s.entries.iter_mut() {
            e.next_run = e.schedule.after(&start).next();
        }

        // 03:00 sweep, 04:30 rollup
        assert!(s.take_due(Utc.with_ymd_and_hms(2024, 1, 1, 2, 59, 0).unwrap()).is_empty());
        let at_three = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 10).unwrap();
        assert_eq!(s.take_due(at_three), vec![Routine::IngestionSweep]);
        assert!(s.take_due(at_three).is_empty());

        let later = Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap();
        assert_eq!(s.take_due(later), vec![Routine::DailyAnalytics]);
        assert_eq!(
            s.entries[0].next_run,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap())
        );
    }
}
