//! Child-process execution with a merged, line-streamed output channel.
//!
//! Both stdout and stderr of the child are attached to the write end of one OS pipe, so the
//! parent sees lines in the order the child wrote them. A reader thread turns the pipe into
//! lines and hands them over a bounded channel; the consumer (echo + extraction + persist) sets
//! the pace.

use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::RunnerError;
use crate::harness::Invocation;

/// Lines buffered between the pipe reader and the consumer.
const LINE_BUFFER: usize = 256;

/// How often the consumer wakes up to check the interrupt flag and the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a child that ran to completion (successfully or not).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code; `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    /// Number of output lines delivered.
    pub lines: usize,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one benchmark invocation, delivering each complete output line to `on_line` as it
/// arrives. A non-zero exit is reported through [`ExitReport`], not as an error.
pub trait BenchmarkRunner {
    fn run(
        &mut self,
        invocation: &Invocation,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ExitReport, RunnerError>;
}

#[derive(Clone, Debug)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    interrupt: Arc<AtomicBool>,
    echo: bool,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            timeout: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            echo: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a flag that, once set, kills the active child.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Whether child output is copied to stdout as it streams.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn spawn(invocation: &Invocation) -> Result<(Child, io::PipeReader), RunnerError> {
        let spawn_err = |source| RunnerError::Spawn {
            program: invocation.program.display().to_string(),
            source,
        };

        let (reader, writer) = io::pipe().map_err(spawn_err)?;
        let stdout = writer.try_clone().map_err(spawn_err)?;

        // `cmd` owns the parent's copies of the write end; it must drop before reading or the
        // pipe never reports EOF.
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(writer);
        // Own process group, so a launcher script and everything it starts can be killed together.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let child = cmd.spawn().map_err(spawn_err)?;
        drop(cmd);

        Ok((child, reader))
    }
}

fn pump_lines(reader: io::PipeReader, tx: mpsc::SyncSender<io::Result<String>>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

/// Kill the child's whole process group, then reap the child.
fn abandon(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            tracing::debug!(error = %e, "killpg failed; process group already gone");
        }
    }
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "kill failed; child already exited");
    }
    if let Err(e) = child.wait() {
        tracing::debug!(error = %e, "failed to reap abandoned child");
    }
}

impl BenchmarkRunner for ProcessRunner {
    fn run(
        &mut self,
        invocation: &Invocation,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ExitReport, RunnerError> {
        let (mut child, reader) = Self::spawn(invocation)?;
        tracing::debug!(pid = child.id(), command = %invocation.display(), "spawned benchmark");

        let (tx, rx) = mpsc::sync_channel(LINE_BUFFER);
        let pump = thread::spawn(move || pump_lines(reader, tx));

        let started = Instant::now();
        let mut lines = 0usize;
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                abandon(&mut child);
                return Err(RunnerError::Interrupted);
            }

            let wait = match self.timeout {
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        abandon(&mut child);
                        return Err(RunnerError::TimedOut(limit));
                    }
                    (limit - elapsed).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            match rx.recv_timeout(wait) {
                Ok(Ok(line)) => {
                    let line = line.trim_end_matches(['\n', '\r']);
                    if self.echo {
                        println!("{line}");
                    }
                    on_line(line);
                    lines += 1;
                }
                Ok(Err(e)) => {
                    abandon(&mut child);
                    return Err(RunnerError::Io(e));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait()?;
        // The sender is gone, so the pump has already returned.
        if pump.join().is_err() {
            tracing::debug!("output reader thread panicked");
        }

        // The flag may be raised after the last line but before the child exits.
        if self.interrupt.load(Ordering::SeqCst) {
            return Err(RunnerError::Interrupted);
        }

        Ok(ExitReport {
            code: status.code(),
            lines,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    fn collect(
        runner: &mut ProcessRunner,
        inv: &Invocation,
    ) -> (Result<ExitReport, RunnerError>, Vec<String>) {
        let mut seen = Vec::new();
        let res = runner.run(inv, &mut |l: &str| seen.push(l.to_string()));
        (res, seen)
    }

    #[test]
    fn test_merges_stdout_and_stderr_in_order() {
        let mut runner = ProcessRunner::new().echo(false);
        let (res, seen) = collect(&mut runner, &sh("echo one; echo two 1>&2; echo three"));
        let report = res.unwrap();
        assert!(report.success());
        assert_eq!(report.lines, 3);
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_nonzero_exit_is_a_report_not_an_error() {
        let mut runner = ProcessRunner::new().echo(false);
        let (res, seen) = collect(&mut runner, &sh("echo partial; exit 3"));
        let report = res.unwrap();
        assert!(!report.success());
        assert_eq!(report.code, Some(3));
        assert_eq!(seen, vec!["partial"]);
    }

    #[test]
    fn test_final_line_without_newline_is_delivered() {
        let mut runner = ProcessRunner::new().echo(false);
        let (res, seen) = collect(&mut runner, &sh("printf 'a\\nb'"));
        assert!(res.unwrap().success());
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let mut runner = ProcessRunner::new().echo(false);
        let inv = Invocation::new("/nonexistent/cjfr").arg("benchmark");
        let (res, seen) = collect(&mut runner, &inv);
        assert!(matches!(res, Err(RunnerError::Spawn { .. })));
        assert!(seen.is_empty());
    }

    #[test]
    fn test_timeout_kills_child() {
        let mut runner = ProcessRunner::new()
            .echo(false)
            .with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let (res, _) = collect(&mut runner, &sh("exec sleep 10"));
        assert!(matches!(res, Err(RunnerError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_kills_grandchildren() {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let mut runner = ProcessRunner::new()
            .echo(false)
            .with_timeout(Some(Duration::from_millis(300)));
        let (res, seen) = collect(&mut runner, &sh("echo $$; sleep 7; echo done"));
        assert!(matches!(res, Err(RunnerError::TimedOut(_))));

        let group = Pid::from_raw(seen[0].parse().unwrap());
        // Killed members may linger as zombies until init reaps them.
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            match killpg(group, None::<Signal>) {
                Err(Errno::ESRCH) => break,
                _ if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
                other => panic!("process group {group} still alive: {other:?}"),
            }
        }
        assert!(!seen.iter().any(|l| l == "done"));
    }

    #[test]
    fn test_interrupt_flag_kills_child() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut runner = ProcessRunner::new().echo(false).with_interrupt(flag);
        let (res, _) = collect(&mut runner, &sh("exec sleep 10"));
        assert!(matches!(res, Err(RunnerError::Interrupted)));
    }
}
