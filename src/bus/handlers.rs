use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    EventBus, EventHandler, HandlerError, Notification, NotificationKind, PolicyTrigger, Topic,
};
use crate::dispatch::Coordinator;
use crate::ledger::{PolicyQuery, PolicyStore};
use crate::model::HookType;

/// Fans an `ImagePushed` event out to every active policy of the project:
/// one `StartWebhook` per policy subscribed to push events and one
/// `StartPreheat` per policy subscribed to preheat.
pub struct OnPushHandler {
    store: Arc<dyn PolicyStore>,
}

impl OnPushHandler {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for OnPushHandler {
    fn name(&self) -> &'static str {
        "on_push"
    }

    async fn handle(&self, bus: &EventBus, notification: &Notification) -> Result<(), HandlerError> {
        let Notification::ImagePushed(event) = notification else {
            return Err(HandlerError::unexpected(NotificationKind::ImagePushed, notification));
        };

        let routes: [(HookType, Topic, fn(PolicyTrigger) -> Notification); 2] = [
            (HookType::PushImage, Topic::StartWebhook, Notification::StartWebhook),
            (HookType::P2pPreheat, Topic::StartPreheat, Notification::StartPreheat),
        ];

        let mut total = 0;
        let mut errors = Vec::new();
        for (hook, topic, wrap) in routes {
            let policies = self
                .store
                .get_policies_by_project(event.project_id, &PolicyQuery::active_for(hook))?;
            debug!(project_id = event.project_id, %hook, policies = policies.len(), "Policies resolved");

            for policy in policies {
                total += 1;
                let policy_id = policy.id;
                let trigger = wrap(PolicyTrigger {
                    policy,
                    candidates: vec![event.candidate(HookType::PushImage)],
                });
                match bus.publish(topic, &trigger).await {
                    Ok(report) if report.failed == 0 => {}
                    Ok(report) => errors.push(format!(
                        "policy {}: {} {} handler(s) failed",
                        policy_id, report.failed, topic
                    )),
                    Err(e) => errors.push(format!("policy {}: {}", policy_id, e)),
                }
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        warn!(project_id = event.project_id, failed = errors.len(), total, "Push fan-out incomplete");
        Err(HandlerError::Aggregate { total, errors })
    }
}

pub struct StartWebhookHandler {
    coordinator: Coordinator,
}

impl StartWebhookHandler {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl EventHandler for StartWebhookHandler {
    fn name(&self) -> &'static str {
        "start_webhook"
    }

    async fn handle(&self, _bus: &EventBus, notification: &Notification) -> Result<(), HandlerError> {
        let Notification::StartWebhook(trigger) = notification else {
            return Err(HandlerError::unexpected(NotificationKind::StartWebhook, notification));
        };
        let summary = self
            .coordinator
            .start_webhook(&trigger.policy, trigger.candidates.clone())
            .await?;
        debug!(policy_id = trigger.policy.id, ?summary, "Webhook trigger handled");
        Ok(())
    }
}

pub struct StartPreheatHandler {
    coordinator: Coordinator,
}

impl StartPreheatHandler {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl EventHandler for StartPreheatHandler {
    fn name(&self) -> &'static str {
        "start_preheat"
    }

    async fn handle(&self, _bus: &EventBus, notification: &Notification) -> Result<(), HandlerError> {
        let Notification::StartPreheat(trigger) = notification else {
            return Err(HandlerError::unexpected(NotificationKind::StartPreheat, notification));
        };
        let summary = self
            .coordinator
            .start_preheat(&trigger.policy, trigger.candidates.clone())
            .await?;
        debug!(policy_id = trigger.policy.id, ?summary, "Preheat trigger handled");
        Ok(())
    }
}
