//! Fault routing scenario.
//!
//! Every command of the shell fails in a different place. None of the
//! failures is awaited, so each one must show up exactly once at the fault
//! sink, and none may take down the UI thread or a worker.

use std::sync::Arc;
use std::time::Duration;

use caliburn_core::{
    spawn_on, EventAggregator, Fault, HandlerResult, ThreadOption, ThreadPool, UiContext,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Time each command spends "working" before it fails
const WORK_DELAY: Duration = Duration::from_millis(100);

/// How long to wait for unobserved faults to arrive
const FAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Message whose only handler always fails
struct Refresh;

fn reject_refresh(_message: &Refresh) -> HandlerResult {
    anyhow::bail!("Error in refresh handler.")
}

pub struct ShellViewModel {
    context: UiContext,
    pool: Arc<ThreadPool>,
}

impl ShellViewModel {
    pub fn new(context: UiContext, pool: Arc<ThreadPool>) -> Self {
        Self { context, pool }
    }

    fn on_execute(context: &UiContext) -> HandlerResult {
        anyhow::ensure!(context.check_access(), "execute ran off the UI thread");
        anyhow::bail!("Error on execute.")
    }

    /// Fails synchronously inside a UI-thread action
    pub fn execute(&self) {
        let context = self.context.clone();
        self.context.run(move || Self::on_execute(&context)).observe();
    }

    /// Hops to the pool, then back to the UI thread, and fails there
    pub fn ui_context_run(&self) {
        let context = self.context.clone();
        spawn_on(self.pool.as_ref(), self.context.fault_sink(), async move {
            anyhow::ensure!(!context.check_access(), "expected a worker thread");
            tokio::time::sleep(WORK_DELAY).await;

            let ui_context = context.clone();
            context
                .run(move || {
                    anyhow::ensure!(ui_context.check_access(), "expected the UI thread");
                    anyhow::bail!("Error on a background task.")
                })
                .observe();
            Ok(())
        })
        .observe();
    }

    /// Fails on the pool
    pub fn task_run(&self) {
        let context = self.context.clone();
        spawn_on(self.pool.as_ref(), self.context.fault_sink(), async move {
            anyhow::ensure!(!context.check_access(), "expected a worker thread");
            tokio::time::sleep(WORK_DELAY).await;
            anyhow::bail!("Error on a background task.")
        })
        .observe();
    }

    /// Fails after an await, still on the UI thread
    pub fn run_async(&self) {
        let context = self.context.clone();
        self.context
            .spawn(async move {
                anyhow::ensure!(context.check_access(), "expected the UI thread");
                tokio::time::sleep(WORK_DELAY).await;
                anyhow::ensure!(context.check_access(), "resumed off the UI thread");
                anyhow::bail!("Error on async execute.")
            })
            .observe();
    }
}

/// Run the scenario; must be driven on the UI thread
pub async fn run(
    context: UiContext,
    pool: Arc<ThreadPool>,
    events: Arc<EventAggregator>,
    mut faults: mpsc::UnboundedReceiver<Fault>,
) -> HandlerResult {
    anyhow::ensure!(context.check_access(), "fault scenario must run on the UI thread");

    // Handlers on the publisher's thread fail the publish call itself
    let subscription = events.subscribe(reject_refresh, ThreadOption::PublisherThread);
    match events.publish(Refresh) {
        Err(e) => info!(error = %e, "Publish failed synchronously"),
        Ok(()) => warn!("Publish unexpectedly succeeded"),
    }
    events.unsubscribe(&subscription);

    let shell = ShellViewModel::new(context, pool);
    shell.execute();
    shell.ui_context_run();
    shell.task_run();
    shell.run_async();

    let expected = 4;
    for received in 0..expected {
        match tokio::time::timeout(FAULT_TIMEOUT, faults.recv()).await {
            Ok(Some(fault)) => info!(n = received + 1, fault = %fault, "Fault reached the sink"),
            Ok(None) => anyhow::bail!("fault sink closed after {received} faults"),
            Err(_) => anyhow::bail!("only {received} of {expected} faults arrived"),
        }
    }

    info!(count = expected, "All faults observed");
    Ok(())
}
