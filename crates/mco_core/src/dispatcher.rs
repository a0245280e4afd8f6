use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{oneshot, Semaphore};

use crate::adapter::{Adapter, AdapterOutput, DetectResult};
use crate::aggregate::decide;
use crate::normalize::Normalizer;
use crate::output_buffer::OutputBuffer;
use crate::result::{ProviderResult, RunResult};
use crate::runner::{CancelReason, Runner, RunnerOutcome};
use crate::state::RunState;
use crate::task::{ProviderSpec, Task};
use crate::watchdog::Watchdog;

/// A provider the dispatcher knows how to run: its detection defaults and
/// the adapter that implements its CLI contract. Built by the caller (the
/// CLI layer, via `mco_providers`'s registry) so `mco_core` never has to
/// know about concrete provider crates.
pub struct ProviderEntry {
    pub spec: ProviderSpec,
    pub adapter: Arc<dyn Adapter>,
}

/// Bytes captured per stream before falling back to disk spill. An
/// implementation default rather than a tunable.
const DEFAULT_CAPTURE_BYTES: usize = 1024 * 1024;

/// Fans a task out across its providers, holds no lock while runners
/// execute beyond the admission semaphore's internal one, and blocks until
/// every provider has reached a terminal state.
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Runs `task` against every `ProviderEntry`, in `providers` order
    /// (which becomes the canonical ordering for the resulting
    /// `RunResult.provider_results` and its findings).
    ///
    /// `external_cancel` resolves when the whole task should be cancelled
    /// (e.g. the CLI's `tokio::signal::ctrl_c()` future) — every
    /// still-running provider is cancelled with `CancelReason::External`,
    /// but the dispatcher still waits for all of them to reach a terminal
    /// state before returning.
    pub async fn run_task(
        &self,
        task: &Task,
        providers: Vec<ProviderEntry>,
        external_cancel: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> RunResult {
        let started_at = OffsetDateTime::now_utc();

        let permits = if task.policy.max_provider_parallelism == 0 {
            providers.len().max(1)
        } else {
            task.policy.max_provider_parallelism
        };
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut join_handles = Vec::new();
        let mut handle_receivers = Vec::new();

        for entry in providers {
            let task_provider_id = entry.spec.id.clone();
            let semaphore = semaphore.clone();
            let task = task.clone();
            let (handle_tx, handle_rx) = oneshot::channel();

            let join = tokio::spawn(async move {
                run_one_provider(task, entry, semaphore, started_at, handle_tx).await
            });
            join_handles.push((task_provider_id, join));
            handle_receivers.push(handle_rx);
        }

        let cancel_handles: Vec<_> = futures_util::future::join_all(handle_receivers)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect();

        tokio::spawn(async move {
            external_cancel.await;
            for handle in cancel_handles {
                handle.cancel(CancelReason::External);
            }
        });

        let mut provider_results = Vec::with_capacity(join_handles.len());
        for (provider_id, join) in join_handles {
            match join.await {
                Ok(result) => provider_results.push(result),
                Err(_join_err) => {
                    // The provider's own task panicked; record it rather
                    // than losing the provider from the run entirely.
                    let now = OffsetDateTime::now_utc();
                    provider_results.push(ProviderResult {
                        provider_id,
                        run_state: RunState::SpawnFailed,
                        error_kind: Some(crate::error::ErrorKind::Internal),
                        auth_ok: false,
                        findings: Vec::new(),
                        summary: None,
                        exit_code: None,
                        started_at: now,
                        finished_at: now,
                        truncated: false,
                        stdout_text: String::new(),
                        stderr_text: String::new(),
                    });
                }
            }
        }

        let finished_at = OffsetDateTime::now_utc();
        let decision = decide(task.mode, &provider_results);

        RunResult {
            task_id: task.task_id.clone(),
            decision,
            provider_results,
            started_at,
            finished_at,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_one_provider(
    task: Task,
    entry: ProviderEntry,
    semaphore: Arc<Semaphore>,
    run_started_at: OffsetDateTime,
    handle_tx: oneshot::Sender<crate::runner::CancelHandle>,
) -> ProviderResult {
    let normalizer = Normalizer::new(entry.spec.id.clone());

    let detect_result = entry.adapter.detect(&entry.spec).await;
    let (resolved_binary, auth_ok) = match detect_result {
        DetectResult::NotDetected => {
            let now = OffsetDateTime::now_utc();
            return normalizer.finalize(
                RunState::SkippedUndetected,
                None,
                None,
                false,
                false,
                now,
                now,
                String::new(),
                String::new(),
            );
        }
        DetectResult::Detected {
            resolved_binary,
            auth_ok,
        } => (resolved_binary, auth_ok),
    };

    let invocation = match entry
        .adapter
        .build_invocation(&task, &resolved_binary, &task.path_constraints)
    {
        Ok(invocation) => invocation,
        Err(_) => {
            let now = OffsetDateTime::now_utc();
            return normalizer.finalize(
                RunState::PermissionUnmet,
                None,
                None,
                auth_ok,
                false,
                now,
                now,
                String::new(),
                String::new(),
            );
        }
    };

    // Hold the admission permit for the lifetime of the runner; everything
    // before this point (detect, build_invocation) is cheap enough to run
    // unbounded ahead of the parallelism cap.
    let _permit = semaphore.acquire_owned().await;

    let stdout_buffer = Arc::new(OutputBuffer::new(DEFAULT_CAPTURE_BYTES));
    let stderr_buffer = Arc::new(OutputBuffer::new(DEFAULT_CAPTURE_BYTES));
    let grace = Duration::from_secs(task.policy.cancel_grace_seconds);
    let runner = Arc::new(Runner::new(
        stdout_buffer.clone(),
        stderr_buffer.clone(),
        grace,
    ));

    let _ = handle_tx.send(runner.cancel_handle());

    let stall_window = Duration::from_secs(task.policy.stall_window_seconds(&entry.spec.id));
    let hard_deadline = if task.policy.review_hard_timeout_seconds > 0 {
        Some(Duration::from_secs(task.policy.review_hard_timeout_seconds))
    } else {
        None
    };
    let watchdog = Watchdog::new(runner.cancel_handle(), stall_window, hard_deadline);
    let (stop_tx, stop_rx) = oneshot::channel();
    let watchdog_runner = runner.clone();
    let watchdog_task = tokio::spawn(async move {
        watchdog
            .watch(move || watchdog_runner.bytes_seen(), stop_rx)
            .await;
    });

    let provider_started_at = OffsetDateTime::now_utc().max(run_started_at);
    let outcome = runner.run(invocation).await;
    let _ = stop_tx.send(());
    let _ = watchdog_task.await;
    let finished_at = OffsetDateTime::now_utc();

    let (run_state, exit_code, truncated, parse_outcome, stdout_text, stderr_text) = match outcome {
        RunnerOutcome::SpawnFailed { .. } => {
            (RunState::SpawnFailed, None, false, None, String::new(), String::new())
        }
        RunnerOutcome::Completed {
            exit_code,
            cancel_reason,
        } => {
            let truncated = stdout_buffer.is_truncated() || stderr_buffer.is_truncated();
            let stdout_text = stdout_buffer.captured_text();
            let stderr_text = stderr_buffer.captured_text();
            let adapter_output = AdapterOutput {
                stdout: stdout_text.clone(),
                stderr: stderr_text.clone(),
                exit_code,
                truncated,
            };
            let parsed = entry.adapter.parse(&task, adapter_output);

            let run_state = match cancel_reason {
                Some(CancelReason::Stall) => RunState::CancelledStall,
                Some(CancelReason::Hard) => RunState::CancelledHard,
                Some(CancelReason::External) => RunState::CancelledExternal,
                None => match entry.adapter.classify_exit(exit_code) {
                    None => RunState::ExitedOk,
                    Some(_) => RunState::ExitedErr,
                },
            };
            (run_state, exit_code, truncated, Some(parsed), stdout_text, stderr_text)
        }
    };

    normalizer.finalize(
        run_state,
        parse_outcome,
        exit_code,
        auth_ok,
        truncated,
        provider_started_at,
        finished_at,
        stdout_text,
        stderr_text,
    )
}
