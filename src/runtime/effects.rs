//! Runs entry effects for committed transitions
//!
//! A registry subscriber pushes each notification onto a channel; the
//! runner picks them up, calls the `ActionDispatcher` and feeds the outcome
//! back into the registry as an ordinary event.

use super::registry::SessionRegistry;
use super::session::{DispatchOutcome, Notification, Subscriber};
use super::traits::ActionDispatcher;
use crate::state_machine::Event;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Subscriber that forwards notifications to an `EffectRunner`
pub fn notification_channel() -> (Subscriber, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscriber: Subscriber = Arc::new(move |notification: &Notification| {
        if tx.send(notification.clone()).is_err() {
            tracing::warn!(
                conv_id = %notification.conversation_id,
                state = %notification.state,
                "Effect runner gone, dropping notification"
            );
        }
    });
    (subscriber, rx)
}

/// What the runner did with one notification
#[derive(Debug, Clone, PartialEq)]
pub enum EffectReport {
    /// Fallback state after an error: rendering skipped, flag cleared
    Suppressed,
    /// Effect succeeded; `follow_up` is the outcome of the event it returned
    Completed { follow_up: Option<DispatchOutcome> },
    /// Effect failed or timed out; `recovery` is the outcome of `<state>_ERROR`
    Failed { error: String, recovery: DispatchOutcome },
}

pub struct EffectRunner<D: ActionDispatcher + 'static> {
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<D>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    effect_timeout: Duration,
}

impl<D: ActionDispatcher + 'static> EffectRunner<D> {
    pub fn new(
        registry: Arc<SessionRegistry>,
        dispatcher: D,
        notifications: mpsc::UnboundedReceiver<Notification>,
        effect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            dispatcher: Arc::new(dispatcher),
            notifications,
            effect_timeout,
        }
    }

    /// Process notifications until cancelled.
    ///
    /// Effects of one conversation run one after another, in commit order.
    /// Different conversations run concurrently, so a slow conversation
    /// never holds up the others.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Effect runner started");
        let mut lanes: HashMap<String, Lane> = HashMap::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(notification) = self.notifications.recv() => {
                    enqueue(
                        &mut lanes,
                        &self.registry,
                        &self.dispatcher,
                        self.effect_timeout,
                        notification,
                    );
                }
                else => break,
            }
        }
        tracing::info!("Effect runner stopped");
    }

    /// Handle every queued notification inline, including ones queued by
    /// follow-up events, until the channel is empty.
    pub async fn process_pending(&mut self) -> Vec<EffectReport> {
        let mut reports = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            reports.push(
                handle_notification(
                    &self.registry,
                    self.dispatcher.as_ref(),
                    self.effect_timeout,
                    notification,
                )
                .await,
            );
        }
        reports
    }
}

/// Queue of pending effects for one conversation
struct Lane {
    tx: mpsc::UnboundedSender<Notification>,
    handle: JoinHandle<()>,
}

/// Hand a notification to its conversation's lane, starting one if needed
fn enqueue<D: ActionDispatcher + 'static>(
    lanes: &mut HashMap<String, Lane>,
    registry: &Arc<SessionRegistry>,
    dispatcher: &Arc<D>,
    effect_timeout: Duration,
    notification: Notification,
) {
    let conversation_id = notification.conversation_id.clone();
    let (notification, previous) = match lanes.remove(&conversation_id) {
        Some(lane) => match lane.tx.send(notification) {
            Ok(()) => {
                lanes.insert(conversation_id, lane);
                return;
            }
            // The lane went idle and is finishing; chain a new one behind it
            Err(mpsc::error::SendError(notification)) => (notification, Some(lane.handle)),
        },
        None => (notification, None),
    };

    lanes.retain(|_, lane| !lane.handle.is_finished());

    let (tx, rx) = mpsc::unbounded_channel();
    // Cannot fail: the receiver is alive until the lane task runs
    let _ = tx.send(notification);
    let handle = tokio::spawn(run_lane(
        registry.clone(),
        dispatcher.clone(),
        effect_timeout,
        rx,
        previous,
    ));
    lanes.insert(conversation_id, Lane { tx, handle });
}

/// Handle a conversation's notifications in order until its queue is empty
async fn run_lane<D: ActionDispatcher + 'static>(
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<D>,
    effect_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<Notification>,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            tracing::error!(error = %e, "Effect lane panicked");
        }
    }

    loop {
        let notification = match rx.try_recv() {
            Ok(n) => n,
            Err(_) => {
                // Refuse new work, then pick up anything sent before the close
                rx.close();
                match rx.try_recv() {
                    Ok(n) => n,
                    Err(_) => break,
                }
            }
        };
        handle_notification(&registry, dispatcher.as_ref(), effect_timeout, notification).await;
    }
}

/// Run the entry effect for one notification and report back into the registry
pub async fn handle_notification<D: ActionDispatcher + ?Sized>(
    registry: &SessionRegistry,
    dispatcher: &D,
    effect_timeout: Duration,
    notification: Notification,
) -> EffectReport {
    let Notification {
        conversation_id,
        generation,
        state,
        context,
    } = notification;

    if context.suppress_next_notification {
        tracing::info!(
            conv_id = %conversation_id,
            state = %state,
            "Skipping entry effect after error recovery"
        );
        registry.dispatch_if_current(&conversation_id, generation, Event::ClearSuppression);
        return EffectReport::Suppressed;
    }

    let effect = dispatcher.on_state_entered(&conversation_id, state, &context);
    let outcome = match tokio::time::timeout(effect_timeout, effect).await {
        Ok(result) => result,
        Err(_) => Err(format!("effect timed out after {}s", effect_timeout.as_secs())),
    };

    let report = match outcome {
        Ok(follow_up) => {
            let follow_up = follow_up.map(|event| {
                tracing::debug!(
                    conv_id = %conversation_id,
                    event = %event,
                    "Effect produced follow-up event"
                );
                registry.dispatch_if_current(&conversation_id, generation, event)
            });
            EffectReport::Completed { follow_up }
        }
        Err(error) => {
            tracing::error!(
                conv_id = %conversation_id,
                state = %state,
                error = %error,
                "Entry effect failed, falling back"
            );
            let recovery =
                registry.dispatch_if_current(&conversation_id, generation, Event::failed(state));
            EffectReport::Failed { error, recovery }
        }
    };

    if state.is_terminal() {
        registry.end_if_current(&conversation_id, generation);
    }

    report
}
