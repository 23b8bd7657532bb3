// src/scheduler.rs
//! Fixed-interval driver for the engine.
//!
//! Each tick is awaited before the next interval is polled, so ticks never
//! overlap. With a config path set, the file's mtime is checked before each
//! tick and a changed file is reloaded into the running engine.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::load_config_from;
use crate::engine::ForecastEngine;
use crate::providers::ClientDeps;

#[derive(Clone, Debug)]
pub struct SchedulerCfg {
    pub tick: Duration,
    /// Config file to watch for changes.
    pub config_path: Option<PathBuf>,
}

struct ConfigWatch {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
}

impl ConfigWatch {
    fn new(path: PathBuf) -> Self {
        let last_mtime = mtime(&path);
        Self { path, last_mtime }
    }

    /// True once per modification of the watched file.
    fn changed(&mut self) -> bool {
        let now = mtime(&self.path);
        if now.is_some() && now != self.last_mtime {
            self.last_mtime = now;
            return true;
        }
        false
    }
}

fn mtime(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Runs `engine` every `cfg.tick` until the returned handle is aborted.
pub fn spawn_engine_scheduler(
    mut engine: ForecastEngine,
    deps: ClientDeps,
    cfg: SchedulerCfg,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut watch = cfg.config_path.clone().map(ConfigWatch::new);
        let mut ticker = tokio::time::interval(cfg.tick.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            if let Some(w) = watch.as_mut() {
                if w.changed() {
                    match load_config_from(&w.path) {
                        Ok(new_cfg) => engine.reload_config(new_cfg, &deps),
                        Err(e) => tracing::warn!(
                            target: "forecast",
                            error = ?e,
                            "config reload failed, keeping previous config"
                        ),
                    }
                }
            }

            let report = engine.tick(Utc::now()).await;
            tracing::debug!(
                target: "forecast",
                attempted = report.attempted(),
                failed = ?report.failed(),
                "scheduled tick"
            );
        }
    })
}
