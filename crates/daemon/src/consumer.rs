// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binds broker deliveries to the worker pool, decodes each [`TaskMessage`],
//! and dispatches the outcome back to the broker (ack, requeue, or drop)
//! according to the orchestrator's verdict.

use std::sync::Arc;

use packlab_broker::AmqpBroker;
use packlab_core::Clock;
use packlab_engine::{Orchestrator, OrchestratorOutcome, TaskMessage, WorkerPool};

/// Ties a broker, worker pool, and orchestrator together into a consume
/// loop. Owned by `main.rs`; one instance per daemon process.
pub struct Consumer<C: Clock> {
    broker: AmqpBroker,
    pool: Arc<WorkerPool>,
    orchestrator: Arc<Orchestrator<C>>,
}

impl<C: Clock + 'static> Consumer<C> {
    pub fn new(broker: AmqpBroker, pool: Arc<WorkerPool>, orchestrator: Arc<Orchestrator<C>>) -> Self {
        Self {
            broker,
            pool,
            orchestrator,
        }
    }

    /// Consumes deliveries until the broker channel closes (on `stop()` of
    /// the pool, or a shutdown-driven drop of the receiver). Each delivery
    /// is dispatched to its own task so a slow analysis run never blocks
    /// acceptance of the next delivery off the wire; backpressure comes from
    /// the worker pool's semaphore, not from the consume loop itself.
    pub async fn run(&self, consumer_tag: &str) -> packlab_broker::Result<()> {
        let mut deliveries = self.broker.consume(consumer_tag).await?;
        while let Some(delivery) = deliveries.recv().await {
            let pool = self.pool.clone();
            let orchestrator = self.orchestrator.clone();
            let broker = self.broker.clone();
            tokio::spawn(async move {
                let payload = delivery.payload.clone();
                let message = match TaskMessage::decode(&payload) {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::error!(error = %err, "dropping undecodable task message");
                        if let Err(err) = delivery.nack(false).await {
                            tracing::error!(error = %err, "failed to nack undecodable message");
                        }
                        return;
                    }
                };

                let task_id = message.task_id.clone();
                let outcome = pool
                    .submit_and_wait(|| async { orchestrator.run(&task_id).await })
                    .await;

                match outcome {
                    Ok(OrchestratorOutcome::Completed)
                    | Ok(OrchestratorOutcome::Cancelled)
                    | Ok(OrchestratorOutcome::TerminalFailure { .. }) => {
                        if let Err(err) = delivery.ack().await {
                            tracing::error!(task_id = %task_id, error = %err, "failed to ack delivery");
                        }
                    }
                    Ok(OrchestratorOutcome::RetryableFailure { failure_type, message: msg }) => {
                        tracing::warn!(task_id = %task_id, ?failure_type, message = %msg, "requeueing after retryable failure");
                        if let Err(err) = broker.publish(&payload).await {
                            tracing::error!(task_id = %task_id, error = %err, "failed to republish task; nacking with requeue");
                            let _ = delivery.nack(true).await;
                            return;
                        }
                        if let Err(err) = delivery.ack().await {
                            tracing::error!(task_id = %task_id, error = %err, "failed to ack delivery after republish");
                        }
                    }
                    Err(err) => {
                        tracing::error!(task_id = %task_id, error = %err, "worker pool rejected task; nacking with requeue");
                        if let Err(err) = delivery.nack(true).await {
                            tracing::error!(task_id = %task_id, error = %err, "failed to nack after pool rejection");
                        }
                    }
                }
            });
        }
        Ok(())
    }
}
