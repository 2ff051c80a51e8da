// src/schedule.rs
//! Fixed daily timetable and the wake-up loop that drives refresh sessions.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::str::FromStr;

/// One point in the daily timetable. Always a valid wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScheduleEntry {
    time: NaiveTime,
}

impl ScheduleEntry {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("invalid schedule time {hour:02}:{minute:02}"))?;
        Ok(Self { time })
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn minute(&self) -> u32 {
        self.time.minute()
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }
}

impl FromStr for ScheduleEntry {
    type Err = anyhow::Error;

    /// Accepts `"H:MM"` / `"HH:MM"`.
    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim();
        let (h, m) = t
            .split_once(':')
            .ok_or_else(|| anyhow!("schedule entry {t:?} is not HH:MM"))?;
        let hour: u32 = h
            .parse()
            .with_context(|| format!("schedule entry {t:?}: bad hour"))?;
        let minute: u32 = m
            .parse()
            .with_context(|| format!("schedule entry {t:?}: bad minute"))?;
        Self::new(hour, minute).with_context(|| format!("schedule entry {t:?}"))
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Ordered, non-empty set of daily trigger times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timetable {
    entries: Vec<ScheduleEntry>,
}

impl Timetable {
    pub fn new(mut entries: Vec<ScheduleEntry>) -> Result<Self> {
        if entries.is_empty() {
            bail!("timetable needs at least one entry");
        }
        entries.sort();
        entries.dedup();
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// First scheduled timestamp strictly after `now`; rolls over to the
    /// first slot of the following day when today's slots are all spent.
    pub fn next_trigger(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        if let Some(slot) = self
            .entries
            .iter()
            .map(|e| today.and_time(e.time()))
            .find(|t| *t > now)
        {
            return slot;
        }
        // entries is non-empty (checked in `new`)
        let tomorrow = today + ChronoDuration::days(1);
        tomorrow.and_time(self.entries[0].time())
    }
}

/// Source of wall-clock time and of suspension until a deadline.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
    async fn sleep_until(&self, deadline: NaiveDateTime);
}

/// Local wall clock backed by tokio's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    async fn sleep_until(&self, deadline: NaiveDateTime) {
        let remaining = (deadline - self.now()).to_std().unwrap_or_default();
        tokio::time::sleep(remaining).await;
    }
}

/// Work the scheduler triggers; one call = one session.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn run(&self);
}

pub struct Scheduler<C, J> {
    timetable: Timetable,
    clock: C,
    job: J,
}

impl<C: Clock, J: ScheduledJob> Scheduler<C, J> {
    pub fn new(timetable: Timetable, clock: C, job: J) -> Self {
        Self {
            timetable,
            clock,
            job,
        }
    }

    /// Run once right away, then follow the timetable forever.
    pub async fn run_forever(&self) {
        tracing::info!(
            slots = %format_slots(self.timetable.entries()),
            "starting rss updater"
        );
        self.job.run().await;
        loop {
            self.wait_and_run().await;
        }
    }

    /// Sleep until the next slot after "now", then run the job once.
    /// Slots missed while the process was away are not caught up.
    pub async fn wait_and_run(&self) -> NaiveDateTime {
        let now = self.clock.now();
        let next = self.timetable.next_trigger(now);
        let minutes = (next - now).num_seconds() as f64 / 60.0;
        tracing::info!(
            until = %next.format("%Y-%m-%d %H:%M"),
            "sleeping for {minutes:.1} minutes"
        );

        // The wall clock may step back while asleep (DST, NTP); never fire early.
        while self.clock.now() < next {
            self.clock.sleep_until(next).await;
        }

        tracing::info!(
            at = %self.clock.now().format("%Y-%m-%d %H:%M"),
            "scheduled run"
        );
        self.job.run().await;
        next
    }
}

fn format_slots(entries: &[ScheduleEntry]) -> String {
    entries
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
