//! Oracles backed by external programs.
//!
//! The candidate is written to the program's stdin. A mutation command prints
//! the new candidate on stdout; a fitness command prints an [`Evaluation`] as
//! JSON, and a measurement command prints the raw [`QualityMeasurement`]
//! consumed by [`ScoredFitness`](super::ScoredFitness). The target descriptor
//! and strategy reach mutation commands through the `SHINKA_TARGET` and
//! `SHINKA_STRATEGY` environment variables.
//!
//! On Unix each call runs in its own process group. The group is killed when
//! the call ends, so background jobs cannot outlive it or hold its output open.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::schema::{ConfigError, Evaluation};

use super::error::OracleError;
use super::fitness::{QualityMeasurement, QualityMeter};
use super::oracle::{FitnessOracle, MutationOracle};

pub const TARGET_ENV: &str = "SHINKA_TARGET";
pub const STRATEGY_ENV: &str = "SHINKA_STRATEGY";

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Extra time granted to drain output of a program that exited in time.
const OUTPUT_GRACE: Duration = Duration::from_millis(100);

/// An external program invoked once per oracle call.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    /// Build from an argv list (`program arg...`). `name` labels config errors.
    pub fn from_argv(
        name: &'static str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let (program, args) = argv.split_first().ok_or(ConfigError::EmptyCommand(name))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the program with `input` on stdin and return its stdout.
    ///
    /// The whole call, output collection included, is bounded by the timeout.
    fn run(&self, input: &str, envs: &[(&str, &str)]) -> Result<Vec<u8>, OracleError> {
        let deadline = Instant::now() + self.timeout;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(envs.iter().copied())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = input.as_bytes().to_vec();
            thread::spawn(move || {
                // The program may exit without reading its input.
                let _ = stdin.write_all(&payload);
            });
        }
        let stdout = child.stdout.take().map(read_all);
        let stderr = child.stderr.take().map(read_all);

        let status = self.wait(&mut child, deadline);
        kill_group(&mut child);
        let status = status?;

        let stdout = self.collect(stdout, deadline)?;
        let stderr = self.collect(stderr, deadline)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            return Err(OracleError::Failed(format!(
                "`{}` exited with status {}{}",
                self.program,
                status
                    .code()
                    .map_or_else(|| "signal".to_string(), |code| code.to_string()),
                if stderr.is_empty() {
                    String::new()
                } else {
                    format!("; stderr={stderr}")
                }
            )));
        }
        Ok(stdout)
    }

    /// Wait for exit, killing the process group once the deadline passes.
    fn wait(&self, child: &mut Child, deadline: Instant) -> Result<ExitStatus, OracleError> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "`{}` exceeded {:?}, killing process group {}",
                    self.program,
                    self.timeout,
                    child.id()
                );
                kill_group(child);
                let _ = child.wait();
                return Err(OracleError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Output of a reader thread, waiting no longer than the deadline.
    fn collect(
        &self,
        output: Option<Receiver<io::Result<Vec<u8>>>>,
        deadline: Instant,
    ) -> Result<Vec<u8>, OracleError> {
        let Some(output) = output else {
            return Ok(Vec::new());
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        match output.recv_timeout(remaining.max(OUTPUT_GRACE)) {
            Ok(bytes) => Ok(bytes?),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("`{}` kept its output open past {:?}", self.program, self.timeout);
                Err(OracleError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(OracleError::Failed("output reader panicked".to_string()))
            }
        }
    }
}

/// Signal every process in the child's group.
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        // The group id equals the leader's pid and is not reused while members remain.
        let group = child.id() as libc::pid_t;
        // SAFETY: kill(2) has no memory-safety preconditions. ESRCH (group already
        // gone) is the expected outcome after a clean exit.
        unsafe {
            libc::kill(-group, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

fn read_all<R: Read + Send + 'static>(mut source: R) -> Receiver<io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = source.read_to_end(&mut buf).map(|_| buf);
        // Receiver is gone when the call already timed out.
        let _ = tx.send(result);
    });
    rx
}

impl MutationOracle for CommandOracle {
    fn mutate(&self, code: &str, target: &str, strategy: &str) -> Result<String, OracleError> {
        let stdout = self.run(code, &[(TARGET_ENV, target), (STRATEGY_ENV, strategy)])?;
        let candidate =
            String::from_utf8(stdout).map_err(|e| OracleError::InvalidOutput(e.to_string()))?;
        if candidate.trim().is_empty() {
            return Err(OracleError::InvalidOutput(format!(
                "`{}` produced an empty candidate",
                self.program
            )));
        }
        Ok(candidate)
    }
}

impl FitnessOracle for CommandOracle {
    fn evaluate(&self, candidate: &str) -> Result<Evaluation, OracleError> {
        let stdout = self.run(candidate, &[])?;
        serde_json::from_slice(&stdout).map_err(|e| OracleError::InvalidOutput(e.to_string()))
    }
}

impl QualityMeter for CommandOracle {
    fn measure(&self, candidate: &str) -> Result<QualityMeasurement, OracleError> {
        let stdout = self.run(candidate, &[])?;
        serde_json::from_slice(&stdout).map_err(|e| OracleError::InvalidOutput(e.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn sh(script: &str) -> CommandOracle {
        let argv = ["sh", "-c", script].map(String::from);
        CommandOracle::from_argv("test", &argv, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_empty_argv_rejected() {
        assert!(matches!(
            CommandOracle::from_argv("mutate", &[], Duration::from_secs(1)),
            Err(ConfigError::EmptyCommand("mutate"))
        ));
    }

    #[test]
    fn test_mutation_receives_code_and_env() {
        let oracle = sh(r#"cat; printf '# %s %s' "$SHINKA_TARGET" "$SHINKA_STRATEGY""#);
        let child = oracle
            .mutate("def test_a():\n    pass\n", "calculator.py", "add_assertions")
            .unwrap();
        assert_eq!(
            child,
            "def test_a():\n    pass\n# calculator.py add_assertions"
        );
    }

    #[test]
    fn test_empty_mutation_is_invalid() {
        let oracle = sh("cat > /dev/null; echo '   '");
        assert!(matches!(
            oracle.mutate("x", "t", "s"),
            Err(OracleError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_evaluation_parses_json() {
        let oracle =
            sh(r#"cat > /dev/null; echo '{"fitness": 0.7, "metrics": {"coverage": 81.5}}'"#);
        let eval = oracle.evaluate("def test_a(): pass").unwrap();
        assert_eq!(eval.fitness, 0.7);
        assert_eq!(eval.metrics["coverage"], 81.5);

        let garbage = sh("echo not-json");
        assert!(matches!(
            garbage.evaluate("x"),
            Err(OracleError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_nonzero_exit_reports_stderr() {
        let oracle = sh("echo boom >&2; exit 3");
        match oracle.evaluate("x") {
            Err(OracleError::Failed(msg)) => {
                assert!(msg.contains("status 3"), "{msg}");
                assert!(msg.contains("boom"), "{msg}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_overrun_is_killed() {
        let argv = ["sh", "-c", "exec sleep 5"].map(String::from);
        let oracle = CommandOracle::from_argv("test", &argv, Duration::from_millis(100)).unwrap();
        let started = Instant::now();
        assert!(matches!(oracle.evaluate("x"), Err(OracleError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_background_job_does_not_delay_result() {
        let oracle = sh(r#"cat > /dev/null; sleep 3 & echo '{"fitness": 1.0}'"#);
        let started = Instant::now();
        let eval = oracle.evaluate("x").unwrap();
        assert_eq!(eval.fitness, 1.0);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "waited {:?} for a background job",
            started.elapsed()
        );
    }

    #[test]
    fn test_timeout_kills_whole_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("alive");
        let script = format!("(sleep 1; touch '{}') & sleep 5", marker.display());
        let argv = ["sh".to_string(), "-c".to_string(), script];
        let oracle = CommandOracle::from_argv("test", &argv, Duration::from_millis(200)).unwrap();

        let started = Instant::now();
        assert!(matches!(oracle.evaluate("x"), Err(OracleError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "grandchild survived the timeout");
    }

    #[test]
    fn test_measurement_parses_json() {
        let oracle = sh(r#"cat > /dev/null; echo '{
            "coverage": 72.5,
            "seeded_bug_failures": 3,
            "execution_seconds": 0.25,
            "quality": {"test_functions": 4, "total_assertions": 6}
        }'"#);
        let measurement = oracle.measure("def test_a(): pass").unwrap();
        assert_eq!(measurement.coverage, 72.5);
        assert_eq!(measurement.seeded_bug_failures, 3);
        assert_eq!(measurement.execution_time, Duration::from_millis(250));
        assert!(!measurement.timed_out);
        let quality = measurement.quality.unwrap();
        assert_eq!(quality.total_assertions, 6);
        assert_eq!(quality.global_statements, 0);

        let negative = sh(r#"echo '{"coverage": 1.0, "execution_seconds": -1}'"#);
        assert!(matches!(
            negative.measure("x"),
            Err(OracleError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let argv = vec!["/nonexistent/shinka-oracle".to_string()];
        let oracle = CommandOracle::from_argv("test", &argv, Duration::from_secs(1)).unwrap();
        assert!(matches!(oracle.evaluate("x"), Err(OracleError::Io(_))));
    }

    #[test]
    fn test_script_file_oracle() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("score.sh");
        fs::write(
            &script,
            "n=$(wc -l)\nprintf '{\"fitness\": %s}' \"$n\"\n",
        )
        .unwrap();

        let argv = vec!["sh".to_string(), script.display().to_string()];
        let oracle = CommandOracle::from_argv("evaluate", &argv, Duration::from_secs(5)).unwrap();
        let eval = oracle.evaluate("a\nb\nc\n").unwrap();
        assert_eq!(eval.fitness, 3.0);
        assert!(eval.metrics.is_empty());
    }
}
