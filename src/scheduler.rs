// src/scheduler.rs
// =============================================================================
// Runs crawl cycles on a fixed interval.
//
// One cycle:
// 1. Crawl everything newer than the watermark
// 2. Append the results to the store
// 3. Close the transport (tor is relaunched lazily by the next cycle)
//
// Between cycles we sleep. Ctrl-C during a cycle or the sleep is a normal
// shutdown: the transport is closed so an owned tor process never outlives us.
// =============================================================================

use crate::config::ScheduleConfig;
use crate::crawl::CrawlEngine;
use crate::error::{CycleError, StoreError};
use crate::store::NormalizingStore;
use crate::transport::Transport;
use std::future::Future;
use tracing::{error, info};

pub struct Scheduler<T: Transport> {
    engine: CrawlEngine<T>,
    store: NormalizingStore,
    config: ScheduleConfig,
}

// What woke the loop up
enum Step<R> {
    Done(R),
    Interrupted,
}

impl<T: Transport> Scheduler<T> {
    pub fn new(engine: CrawlEngine<T>, store: NormalizingStore, config: ScheduleConfig) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    pub fn engine(&self) -> &CrawlEngine<T> {
        &self.engine
    }

    pub fn store(&self) -> &NormalizingStore {
        &self.store
    }

    /// Crawls, stores, and closes the transport whatever the outcome.
    /// Returns the number of pastes written.
    pub async fn run_cycle_once(&mut self) -> Result<usize, CycleError> {
        let result = self.crawl_and_store().await;
        self.engine.transport_mut().close().await;
        result
    }

    async fn crawl_and_store(&mut self) -> Result<usize, CycleError> {
        let pastes = self.engine.run_cycle().await?;
        Ok(self.store.append_all(pastes)?)
    }

    /// Runs until Ctrl-C (or after one cycle in run-once mode)
    pub async fn run(&mut self) -> Result<(), CycleError> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Runs until `shutdown` resolves, the single cycle of run-once mode
    /// finishes, or a cycle fails without --keep-going.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> Result<(), CycleError> {
        tokio::pin!(shutdown);

        loop {
            let step = tokio::select! {
                result = self.run_cycle_once() => Step::Done(result),
                _ = &mut shutdown => Step::Interrupted,
            };

            match step {
                Step::Interrupted => return self.interrupted().await,
                Step::Done(Ok(written)) => info!(written, "cycle complete"),
                Step::Done(Err(e)) if self.config.keep_going && !self.config.run_once => {
                    error!(error = %e, "cycle failed, retrying at the next interval");
                }
                Step::Done(Err(e)) => return Err(e),
            }

            if self.config.run_once {
                return Ok(());
            }

            info!(hours = self.config.interval.as_secs_f64() / 3600.0, "sleeping until next cycle");
            let step = tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => Step::Done(()),
                _ = &mut shutdown => Step::Interrupted,
            };
            if let Step::Interrupted = step {
                return self.interrupted().await;
            }
        }
    }

    async fn interrupted(&mut self) -> Result<(), CycleError> {
        info!("interrupted, shutting down");
        self.engine.transport_mut().close().await;
        Ok(())
    }

    /// Closes the store
    pub fn finish(self) -> Result<(), StoreError> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlConfig, StoreConfig};
    use crate::crawl::Watermark;
    use crate::transport::fake::FakeTransport;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    const BASE: &str = "http://paste.example.onion/";

    fn seeded_fake() -> FakeTransport {
        let mut fake = FakeTransport::new();
        fake.serve(&format!("{}api/json/list/1", BASE), json!({"result": {"pastes": ["n1", "n2"]}}));
        fake.serve(&format!("{}api/json/list/2", BASE), json!({"result": {"pastes": ["o1"]}}));
        for (id, ts, author) in [("n1", 2_000, "Alice"), ("n2", 1_900, "ANONYMOUS"), ("o1", 500, "Bob")] {
            fake.serve(
                &format!("{}api/json/show/{}", BASE, id),
                json!({"result": {
                    "timestamp": ts,
                    "title": format!(" {} ", id),
                    "author": author,
                    "data": "x\r\ny"
                }}),
            );
        }
        fake
    }

    fn scheduler(fake: FakeTransport, dir: &tempfile::TempDir, config: ScheduleConfig) -> Scheduler<FakeTransport> {
        let crawl = CrawlConfig {
            base_url: BASE.to_string(),
            ..CrawlConfig::default()
        };
        let engine = CrawlEngine::new(fake, &crawl, Watermark::from_epoch(1_000).unwrap()).unwrap();
        let store = NormalizingStore::new(&StoreConfig {
            db_path: dir.path().join("db.json"),
            ..StoreConfig::default()
        })
        .unwrap();
        Scheduler::new(engine, store, config)
    }

    fn run_once() -> ScheduleConfig {
        ScheduleConfig {
            run_once: true,
            ..ScheduleConfig::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_single_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let fake = seeded_fake();
        let log = fake.log.clone();
        let mut scheduler = scheduler(fake, &dir, run_once());

        let before = Utc::now();
        scheduler.run_until(std::future::pending::<()>()).await.unwrap();

        let docs = scheduler.store().documents().unwrap().all();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["title"], "n1");
        assert_eq!(docs[0]["author"], "Alice");
        assert_eq!(docs[1]["author"], "Unknown");
        assert_eq!(docs[1]["data"], "x\ny");
        assert!(scheduler.engine().watermark().last_crawl() >= before);
        assert_eq!(log.lock().unwrap().closes, 1);
        scheduler.finish().unwrap();
    }

    #[tokio::test]
    async fn test_failed_cycle_still_closes_transport() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeTransport::new();
        fake.serve_raw(&format!("{}api/json/list/1", BASE), 200, "not json");
        let log = fake.log.clone();
        let mut scheduler = scheduler(fake, &dir, run_once());

        let result = scheduler.run_until(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(CycleError::Crawl(_))));
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn test_interrupt_during_sleep_closes_transport() {
        let dir = tempfile::tempdir().unwrap();
        let fake = seeded_fake();
        let log = fake.log.clone();
        let config = ScheduleConfig {
            interval: Duration::from_secs(3600),
            ..ScheduleConfig::default()
        };
        let mut scheduler = scheduler(fake, &dir, config);

        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        scheduler.run_until(shutdown).await.unwrap();

        assert_eq!(scheduler.store().documents().unwrap().len(), 2);
        // Once after the cycle, once on shutdown
        assert_eq!(log.lock().unwrap().closes, 2);
    }

    #[tokio::test]
    async fn test_keep_going_survives_failed_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeTransport::new();
        fake.serve_raw(&format!("{}api/json/list/1", BASE), 500, "oops");
        let log = fake.log.clone();
        let config = ScheduleConfig {
            interval: Duration::from_millis(10),
            keep_going: true,
            ..ScheduleConfig::default()
        };
        let mut scheduler = scheduler(fake, &dir, config);

        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        scheduler.run_until(shutdown).await.unwrap();
        assert!(log.lock().unwrap().closes >= 2);
    }
}
