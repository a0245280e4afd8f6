use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;

use crate::adapter::Invocation;
use crate::output_buffer::OutputBuffer;

/// Why a runner was asked to stop. First writer wins — `CancelHandle::cancel`
/// is idempotent, so a stall tick racing an external interrupt can't flip the
/// recorded reason after the fact.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CancelReason {
    Stall,
    Hard,
    External,
}

/// Cloneable, shareable handle used by the `Watchdog` and `Dispatcher` to
/// request cancellation of a running task without holding a reference to the
/// `Runner` itself.
#[derive(Clone)]
pub struct CancelHandle {
    notify: Arc<Notify>,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl CancelHandle {
    fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cancel(&self, reason: CancelReason) {
        let mut guard = self.reason.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(reason);
            drop(guard);
            self.notify.notify_waiters();
        }
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.reason.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Terminal outcome of one runner, before the adapter's `parse` step and the
/// Normalizer see it.
#[derive(Debug)]
pub enum RunnerOutcome {
    Completed {
        exit_code: Option<i32>,
        cancel_reason: Option<CancelReason>,
    },
    SpawnFailed {
        source: std::io::Error,
    },
}

/// Supervises one provider's child process for the duration of one task.
/// Cancellation sends `SIGTERM` to the whole process group, waits out a
/// grace period, then escalates to `SIGKILL` via `libc::kill`.
pub struct Runner {
    stdout_buffer: Arc<OutputBuffer>,
    stderr_buffer: Arc<OutputBuffer>,
    cancel: CancelHandle,
    grace: Duration,
}

impl Runner {
    pub fn new(stdout_buffer: Arc<OutputBuffer>, stderr_buffer: Arc<OutputBuffer>, grace: Duration) -> Self {
        Self {
            stdout_buffer,
            stderr_buffer,
            cancel: CancelHandle::new(),
            grace,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Combined progress counter the `Watchdog` samples: bytes observed on
    /// either stream since the runner started.
    pub fn bytes_seen(&self) -> u64 {
        self.stdout_buffer.bytes_seen() + self.stderr_buffer.bytes_seen()
    }

    pub async fn run(&self, invocation: Invocation) -> RunnerOutcome {
        let mut command = Command::new(&invocation.program);
        // The child inherits the caller's environment unchanged (spec
        // requirement); `invocation.env` only carries the variables an
        // adapter explicitly wants to set or override.
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        #[cfg(unix)]
        command.process_group(0);

        let mut child = match spawn_with_retry(&mut command) {
            Ok(child) => child,
            Err(source) => return RunnerOutcome::SpawnFailed { source },
        };

        let pid = child.id();

        if let Some(prompt) = &invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let prompt = prompt.clone();
                tokio::spawn(async move {
                    let _ = stdin.write_all(prompt.as_bytes()).await;
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let stdout_buffer = self.stdout_buffer.clone();
        let stderr_buffer = self.stderr_buffer.clone();
        let stdout_task = tokio::spawn(tee_stream(stdout, stdout_buffer));
        let stderr_task = tokio::spawn(tee_stream(stderr, stderr_buffer));

        let cancel_reason = tokio::select! {
            () = self.cancel.notify.notified() => {
                let reason = self.cancel.reason();
                self.force_terminate(&mut child, pid).await;
                reason
            }
            status = child.wait() => {
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                return RunnerOutcome::Completed {
                    exit_code: status.ok().and_then(|s| s.code()),
                    cancel_reason: None,
                };
            }
        };

        let _ = stdout_task.await;
        let _ = stderr_task.await;
        let exit_code = child.wait().await.ok().and_then(|s| s.code());
        RunnerOutcome::Completed {
            exit_code,
            cancel_reason,
        }
    }

    /// Sends `SIGTERM` to the child's process group, waits up to `self.grace`
    /// for a natural exit, then escalates to `SIGKILL` and reaps the child.
    #[cfg(unix)]
    async fn force_terminate(&self, child: &mut Child, pid: Option<u32>) {
        if let Some(pid) = pid {
            unsafe {
                libc::kill(-(pid as i32), libc::SIGTERM);
            }
        }
        if tokio::time::timeout(self.grace, child.wait()).await.is_err() {
            if let Some(pid) = pid {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            let _ = child.wait().await;
        }
    }

    #[cfg(not(unix))]
    async fn force_terminate(&self, child: &mut Child, _pid: Option<u32>) {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

async fn tee_stream<R>(mut reader: R, buffer: Arc<OutputBuffer>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buffer.append(&chunk[..n]).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

/// Retries a spawn on `ExecutableFileBusy` (errno 26), which shows up
/// transiently when a provider binary is a freshly-written wrapper script
/// still being closed by another process. Capped backoff, five attempts.
fn spawn_with_retry(command: &mut Command) -> Result<Child, std::io::Error> {
    let mut backoff = Duration::from_millis(2);
    for attempt in 0..5 {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                let is_busy = matches!(source.kind(), std::io::ErrorKind::ExecutableFileBusy)
                    || source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(source);
            }
        }
    }
    unreachable!("spawn_with_retry should return before exhausting retries")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn write_fake_binary(dir: &std::path::Path, name: &str, script: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(script.as_bytes()).unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn invocation(program: std::path::PathBuf, args: Vec<&str>) -> Invocation {
        Invocation {
            program,
            args: args.into_iter().map(str::to_string).collect(),
            env: BTreeMap::new(),
            stdin: None,
            working_dir: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn completes_normally_and_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_fake_binary(dir.path(), "ok.sh", "#!/bin/sh\necho hello\nexit 0\n");

        let runner = Runner::new(
            Arc::new(OutputBuffer::new(4096)),
            Arc::new(OutputBuffer::new(4096)),
            Duration::from_secs(5),
        );
        let outcome = runner.run(invocation(bin, vec![])).await;
        match outcome {
            RunnerOutcome::Completed { exit_code, cancel_reason } => {
                assert_eq!(exit_code, Some(0));
                assert!(cancel_reason.is_none());
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_terminates_a_long_running_child() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_fake_binary(dir.path(), "sleepy.sh", "#!/bin/sh\nsleep 30\n");

        let runner = Runner::new(
            Arc::new(OutputBuffer::new(4096)),
            Arc::new(OutputBuffer::new(4096)),
            Duration::from_millis(200),
        );
        let handle = runner.cancel_handle();

        let run_fut = runner.run(invocation(bin, vec![]));
        tokio::pin!(run_fut);

        tokio::select! {
            _ = &mut run_fut => panic!("runner finished before cancel was issued"),
            () = tokio::time::sleep(Duration::from_millis(50)) => {
                handle.cancel(CancelReason::External);
            }
        }

        let outcome = run_fut.await;
        match outcome {
            RunnerOutcome::Completed { cancel_reason, .. } => {
                assert_eq!(cancel_reason, Some(CancelReason::External));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_not_panicked() {
        let runner = Runner::new(
            Arc::new(OutputBuffer::new(4096)),
            Arc::new(OutputBuffer::new(4096)),
            Duration::from_secs(1),
        );
        let outcome = runner
            .run(invocation(
                std::path::PathBuf::from("/definitely/not/a/real/binary"),
                vec![],
            ))
            .await;
        assert!(matches!(outcome, RunnerOutcome::SpawnFailed { .. }));
    }
}
