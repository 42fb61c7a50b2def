//! Fire-and-forget dispatch of enriched transactions to the goal rule engine
//!
//! A single worker drains the queue in order, so every rule has finished with
//! one transaction before the next transaction starts.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::models::EnrichedTransaction;

use super::engine::{GoalRuleEngine, RuleRunReport};

/// Queue capacity; `dispatch` waits when the worker falls this far behind
const DEFAULT_CAPACITY: usize = 1024;

struct Job {
    transaction: EnrichedTransaction,
    as_of: NaiveDate,
}

pub struct GoalDispatcher {
    sender: mpsc::Sender<Job>,
    worker: JoinHandle<RuleRunReport>,
}

impl GoalDispatcher {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(engine: Arc<GoalRuleEngine>) -> Self {
        Self::with_capacity(engine, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(engine: Arc<GoalRuleEngine>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Job>(capacity.max(1));

        let worker = tokio::spawn(async move {
            let mut total = RuleRunReport::default();
            while let Some(job) = receiver.recv().await {
                let report = engine.run(&job.transaction, job.as_of).await;
                tracing::debug!(
                    transaction = %job.transaction.idempotency_key,
                    signals = report.signals_emitted,
                    failures = report.failures,
                    "Goal rules dispatched"
                );
                total.merge(report);
            }
            tracing::debug!(
                signals = total.signals_emitted,
                failures = total.failures,
                "Goal dispatcher stopped"
            );
            total
        });

        Self { sender, worker }
    }

    /// Queue a transaction for the goal rules
    pub async fn dispatch(&self, transaction: EnrichedTransaction, as_of: NaiveDate) -> Result<()> {
        self.sender
            .send(Job { transaction, as_of })
            .await
            .map_err(|_| Error::RuleExecution {
                rule: "dispatcher".to_string(),
                reason: "goal dispatcher worker has stopped".to_string(),
            })
    }

    /// Close the queue, wait for queued transactions to finish and return the totals
    pub async fn shutdown(self) -> Result<RuleRunReport> {
        drop(self.sender);
        self.worker.await.map_err(|e| Error::RuleExecution {
            rule: "dispatcher".to_string(),
            reason: e.to_string(),
        })
    }
}
