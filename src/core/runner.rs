//! # Run a single lifecycle phase of a provider.
//!
//! Executes one `init`, `start` or `stop` call of a [`ManagedProvider`] on the
//! [`SharedExecutor`] with optional timeout and panic capture, and publishes the
//! failure to the [`Bus`].
//!
//! ## Event flow
//!
//! ```text
//! Success:
//!   provider.<phase>() → Ok(()) → (no event; the actor reports the new state)
//!
//! Failure / panic:
//!   provider.<phase>() → Err(e) | panic → publish ProviderFailed → return Err
//!
//! Timeout:
//!   timeout exceeded → cancel child → abort call → publish ProviderFailed
//!                                                → return Timeout error
//!
//! Cancellation (forced removal):
//!   parent cancelled → abort call → return Canceled (no event)
//! ```
//!
//! ## Rules
//! - Derives a **child token** per phase; `stop` receives it so a forced removal
//!   can interrupt a slow stop sequence
//! - Publishes **at most one** `ProviderFailed` per phase
//! - A panic inside the provider never unwinds into the caller

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ProviderError, panic_message},
    events::{Bus, Event, EventKind},
    monitor::SharedExecutor,
    provider::{ManagedProvider, ProviderContext},
};

/// One provider lifecycle call.
#[derive(Clone, Debug)]
pub(crate) enum Phase {
    Init(ProviderContext),
    Start,
    Stop,
}

impl Phase {
    pub(crate) fn as_label(&self) -> &'static str {
        match self {
            Phase::Init(_) => "init",
            Phase::Start => "start",
            Phase::Stop => "stop",
        }
    }
}

/// Executes `phase` on `provider`, bounded by `timeout` and cancellable through `parent`.
pub(crate) async fn run_phase(
    provider: Arc<dyn ManagedProvider>,
    phase: Phase,
    parent: &CancellationToken,
    timeout: Option<Duration>,
    exec: &SharedExecutor,
    bus: &Bus,
) -> Result<(), ProviderError> {
    let child = parent.child_token();
    let name: Arc<str> = Arc::from(provider.name());
    let label = format!("{}:{}", phase.as_label(), name);
    let phase_label = phase.as_label();

    let call = {
        let child = child.clone();
        async move {
            AssertUnwindSafe(call_phase(provider.as_ref(), &phase, child))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(ProviderError::Panicked {
                        info: panic_message(payload.as_ref()),
                    })
                })
        }
    };
    let mut join = exec.spawn(label, call);

    let waited = async {
        match timeout.filter(|d| *d > Duration::ZERO) {
            Some(dur) => time::timeout(dur, &mut join)
                .await
                .map_err(|_elapsed| ProviderError::Timeout { timeout: dur }),
            None => Ok((&mut join).await),
        }
    };

    let res = tokio::select! {
        r = waited => match r {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) if join_err.is_panic() => Err(ProviderError::Panicked {
                info: panic_message(join_err.into_panic().as_ref()),
            }),
            Ok(Err(_aborted)) => Err(ProviderError::Canceled),
            Err(elapsed) => Err(elapsed),
        },
        _ = child.cancelled() => Err(ProviderError::Canceled),
    };

    if res.is_err() {
        child.cancel();
        join.abort();
    }

    match &res {
        Ok(()) | Err(ProviderError::Canceled) => {}
        Err(e) => publish_failed(bus, &name, phase_label, e),
    }
    res
}

async fn call_phase(
    provider: &dyn ManagedProvider,
    phase: &Phase,
    token: CancellationToken,
) -> Result<(), ProviderError> {
    match phase {
        Phase::Init(ctx) => provider.init(ctx).await,
        Phase::Start => provider.start().await,
        Phase::Stop => provider.stop(token).await,
    }
}

/// Publishes `ProviderFailed` with error details.
fn publish_failed(bus: &Bus, name: &Arc<str>, phase: &'static str, err: &ProviderError) {
    tracing::warn!(provider = %name, phase, error = %err, "provider lifecycle phase failed");
    bus.publish(
        Event::new(EventKind::ProviderFailed)
            .with_provider(Arc::clone(name))
            .with_reason(format!("{phase}: {err}")),
    );
}
