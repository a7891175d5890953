//! Background task that periodically expires overdue subscriptions.
//!
//! Runs in a tokio::spawn loop, checking every `check_interval_secs`
//! (default 3600) for active subscriptions past their `end_date` and
//! transitioning them to `Expired`.

use std::sync::Arc;

use metrics::counter;
use tokio::time::Duration;
use tracing::{info, warn};

use super::subscription::SubscriptionService;
use crate::domain::DomainResult;
use crate::shared::shutdown::ShutdownSignal;

/// Start the subscription expiry background task.
///
/// Multiple instances may run the same sweep concurrently: `expire_one`
/// only transitions records that are still active and past their end
/// date, so duplicates resolve to no-ops.
pub fn start_subscription_expiry_task(
    service: Arc<SubscriptionService>,
    shutdown: ShutdownSignal,
    check_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            check_interval = check_interval_secs,
            "Subscription expiry task started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(check_interval_secs));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match sweep_expired(&service).await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "Expiry sweep completed"),
                        Err(e) => warn!(error = %e, "Subscription expiry sweep error"),
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!("Subscription expiry task shutting down");
                    break;
                }
            }
        }

        info!("Subscription expiry task stopped");
    })
}

/// One sweep over the due set. Records are processed independently: a
/// failure is logged and retried on the next tick, never aborting the
/// batch.
pub async fn sweep_expired(service: &Arc<SubscriptionService>) -> DomainResult<usize> {
    let due = service.find_due_for_expiry().await?;
    if due.is_empty() {
        return Ok(0);
    }

    info!(count = due.len(), "Expiring overdue subscriptions");

    let mut expired = 0usize;
    for subscription in due {
        match service.expire_one(subscription.id).await {
            Ok(true) => expired += 1,
            // Another sweep or instance transitioned it first
            Ok(false) => {}
            Err(e) => {
                warn!(
                    subscription_id = %subscription.id,
                    owner_id = %subscription.owner_id,
                    error = %e,
                    "Failed to expire subscription, will retry next tick"
                );
                counter!("subscription_expiry_failures_total").increment(1);
            }
        }
    }

    counter!("subscription_expiry_total").increment(expired as u64);
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChangedBy, OwnerType, SubscriptionStatus};
    use crate::infrastructure::storage::memory::InMemoryRepositoryProvider;
    use crate::messaging::create_event_bus;
    use crate::shared::OwnerLocks;
    use chrono::{Duration as ChronoDuration, Utc};

    fn service() -> Arc<SubscriptionService> {
        Arc::new(SubscriptionService::new(
            Arc::new(InMemoryRepositoryProvider::new()),
            create_event_bus(),
            Arc::new(OwnerLocks::new()),
        ))
    }

    #[tokio::test]
    async fn sweep_expires_only_due_records() {
        let service = service();
        let user = ChangedBy::User("U1".into());

        service
            .activate(
                "O1",
                OwnerType::User,
                "tier-basic",
                Some(Utc::now() - ChronoDuration::hours(1)),
                &user,
            )
            .await
            .unwrap();
        service
            .activate(
                "O2",
                OwnerType::User,
                "tier-basic",
                Some(Utc::now() + ChronoDuration::hours(1)),
                &user,
            )
            .await
            .unwrap();
        service
            .activate("O3", OwnerType::User, "tier-basic", None, &user)
            .await
            .unwrap();

        assert_eq!(sweep_expired(&service).await.unwrap(), 1);

        let expired = service.subscriptions_for("O1").await.unwrap();
        assert_eq!(expired[0].status, SubscriptionStatus::Expired);
        assert!(service.active_subscription("O2").await.unwrap().is_some());
        assert!(service.active_subscription("O3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn repeated_sweep_is_a_no_op() {
        let bus = create_event_bus();
        let mut subscriber = bus.subscribe();
        let service = Arc::new(SubscriptionService::new(
            Arc::new(InMemoryRepositoryProvider::new()),
            bus,
            Arc::new(OwnerLocks::new()),
        ));
        service
            .activate(
                "O1",
                OwnerType::User,
                "tier-basic",
                Some(Utc::now() - ChronoDuration::hours(1)),
                &ChangedBy::User("U1".into()),
            )
            .await
            .unwrap();

        assert_eq!(sweep_expired(&service).await.unwrap(), 1);
        assert_eq!(sweep_expired(&service).await.unwrap(), 0);

        // One transition, one emitted event, despite two sweeps
        let mut expired_events = 0;
        while let Ok(Some(event)) = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            subscriber.recv(),
        )
        .await
        {
            if matches!(event, crate::domain::Event::SubscriptionExpired(_)) {
                expired_events += 1;
            }
        }
        assert_eq!(expired_events, 1);
    }

    #[tokio::test]
    async fn task_stops_on_shutdown() {
        let shutdown = ShutdownSignal::new();
        let handle = start_subscription_expiry_task(service(), shutdown.clone(), 3600);

        shutdown.trigger();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("task did not stop")
            .unwrap();
    }
}
