use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::command::CommandSpec;
use crate::events::{Bus, BusSender, Event};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Prefix put in front of every forwarded line.
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "[tun] ",
            OutputStream::Stderr => "[tun ERROR] ",
        }
    }
}

impl Display for OutputStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Lines of each output stream kept for [`TunnelExit`]; older lines only reach the log.
pub const OUTPUT_TAIL_LINES: usize = 200;

/// How long the output readers may take to drain once waiting on the process failed.
const READER_GRACE: Duration = Duration::from_secs(1);

/// How the tunnel process ended, with the last lines it printed.
#[derive(Clone, Debug, Default)]
pub struct TunnelExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl TunnelExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Output captured before the tunnel process could no longer be waited on.
///
/// Attached as context to the error returned by [`TunnelProcess::wait`].
#[derive(Clone, Debug, Default)]
pub struct PartialOutput {
    pub stdout: String,
    pub stderr: String,
}

impl Display for PartialOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to wait for the tunnel process")
    }
}

/// A running tunnel process, exclusively owned by the run that started it.
#[async_trait]
pub trait TunnelProcess: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Suspends until the process terminates, for any reason. There is no timeout.
    ///
    /// On failure the error carries a [`PartialOutput`] context.
    async fn wait(&mut self) -> anyhow::Result<TunnelExit>;
}

/// Starts the tunnel executable.
pub trait ProcessLauncher: Send + Sync {
    /// Spawns the process with both output streams captured. Every line is logged and
    /// published on the bus as [`Event::TunnelOutput`].
    fn launch(&self, spec: &CommandSpec, bus: &Bus) -> anyhow::Result<Box<dyn TunnelProcess>>;
}

/// [`ProcessLauncher`] spawning real processes on the tokio runtime.
#[derive(Default)]
pub struct TokioLauncher;

impl ProcessLauncher for TokioLauncher {
    fn launch(&self, spec: &CommandSpec, bus: &Bus) -> anyhow::Result<Box<dyn TunnelProcess>> {
        let mut child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", spec.program))?;

        let stdout = child
            .stdout
            .take()
            .with_context(|| "Tunnel stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .with_context(|| "Tunnel stderr was not captured")?;

        let stdout = tokio::spawn(forward_lines(
            stdout,
            OutputStream::Stdout,
            bus.new_endpoint().sender(),
        ));
        let stderr = tokio::spawn(forward_lines(
            stderr,
            OutputStream::Stderr,
            bus.new_endpoint().sender(),
        ));

        Ok(Box::new(SupervisedProcess {
            child,
            stdout: Some(stdout),
            stderr: Some(stderr),
        }))
    }
}

struct SupervisedProcess {
    child: Child,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
}

#[async_trait]
impl TunnelProcess for SupervisedProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> anyhow::Result<TunnelExit> {
        match self.child.wait().await {
            Ok(status) => {
                // The pipes close with the process, so the readers finish on their own.
                let stdout = collect(self.stdout.take()).await;
                let stderr = collect(self.stderr.take()).await;

                Ok(TunnelExit {
                    code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Err(e) => {
                // The process may still hold the pipes open.
                if let Err(kill) = self.child.start_kill() {
                    debug!("Failed to kill the tunnel process: {:?}", kill);
                }
                let partial = PartialOutput {
                    stdout: collect_within(self.stdout.take(), READER_GRACE).await,
                    stderr: collect_within(self.stderr.take(), READER_GRACE).await,
                };
                Err(anyhow::Error::new(e).context(partial))
            }
        }
    }
}

async fn collect(reader: Option<JoinHandle<String>>) -> String {
    match reader {
        Some(handle) => handle.await.unwrap_or_else(|e| {
            warn!("Tunnel output reader failed: {:?}", e);
            String::new()
        }),
        None => String::new(),
    }
}

/// Like [`collect`], but gives up on a reader that does not finish within `grace`.
async fn collect_within(reader: Option<JoinHandle<String>>, grace: Duration) -> String {
    let Some(mut handle) = reader else {
        return String::new();
    };
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => {
            warn!("Tunnel output reader failed: {:?}", e);
            String::new()
        }
        Err(_) => {
            handle.abort();
            debug!("Tunnel output reader did not finish within {:?}", grace);
            String::new()
        }
    }
}

/// Forwards every line of `reader` to the log and the bus, returning the last
/// [`OUTPUT_TAIL_LINES`] lines.
async fn forward_lines<R>(reader: R, stream: OutputStream, bus: BusSender) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                match stream {
                    OutputStream::Stdout => info!("{}{}", stream.prefix(), line),
                    OutputStream::Stderr => warn!("{}{}", stream.prefix(), line),
                }
                if tail.len() == OUTPUT_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.clone());
                bus.send(Event::TunnelOutput(stream, line));
            }
            Err(e) => {
                warn!("Failed to read tunnel {}: {:?}", stream, e);
                break;
            }
        }
    }

    tail.into_iter().fold(String::new(), |mut captured, line| {
        captured.push_str(&line);
        captured.push('\n');
        captured
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_lines_captures_and_publishes() {
        let bus = Bus::new();
        let mut observer = bus.new_endpoint();
        let sender = bus.new_endpoint().sender();

        let input: &[u8] = b"first\r\nsecond\nno newline";
        let captured = forward_lines(input, OutputStream::Stderr, sender).await;
        assert_eq!(captured, "first\nsecond\nno newline\n");

        for expected in ["first", "second", "no newline"] {
            match observer.recv().await {
                Event::TunnelOutput(OutputStream::Stderr, line) => assert_eq!(line, expected),
                other => panic!("unexpected event {}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_forward_lines_tolerates_invalid_utf8() {
        let bus = Bus::new();
        let input: &[u8] = b"ok \xff\n";
        let captured = forward_lines(input, OutputStream::Stdout, bus.new_endpoint().sender()).await;
        assert_eq!(captured, "ok \u{fffd}\n");
    }

    #[tokio::test]
    async fn test_forward_lines_keeps_bounded_tail() {
        let bus = Bus::new();
        let total = OUTPUT_TAIL_LINES * 50;
        let input: String = (0..total)
            .map(|i| format!("[TCP] 10.0.0.2:{} <-> 93.184.216.34:443\n", 10_000 + i))
            .collect();

        let captured =
            forward_lines(input.as_bytes(), OutputStream::Stdout, bus.new_endpoint().sender())
                .await;

        let lines: Vec<&str> = captured.lines().collect();
        assert_eq!(lines.len(), OUTPUT_TAIL_LINES);
        assert_eq!(
            lines[0],
            format!(
                "[TCP] 10.0.0.2:{} <-> 93.184.216.34:443",
                10_000 + total - OUTPUT_TAIL_LINES
            )
        );
        assert_eq!(
            *lines.last().unwrap(),
            format!("[TCP] 10.0.0.2:{} <-> 93.184.216.34:443", 10_000 + total - 1)
        );
        assert!(captured.len() < input.len() / 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_within_gives_up_on_stuck_reader() {
        let stuck = tokio::spawn(async {
            futures::future::pending::<()>().await;
            String::from("never")
        });
        assert_eq!(collect_within(Some(stuck), READER_GRACE).await, "");

        let done = tokio::spawn(async { String::from("tail\n") });
        assert_eq!(collect_within(Some(done), READER_GRACE).await, "tail\n");
        assert_eq!(collect_within(None, READER_GRACE).await, "");
    }

    #[tokio::test]
    async fn test_launch_missing_executable_fails() {
        let bus = Bus::new();
        let spec = CommandSpec::new("/nonexistent/socksvpn-tun2socks", ["-device", "tun0"]);
        assert!(TokioLauncher.launch(&spec, &bus).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_streams_and_waits() {
        let bus = Bus::new();
        let spec = CommandSpec::new("sh", ["-c", "echo up; echo oops >&2; exit 3"]);
        let mut process = TokioLauncher.launch(&spec, &bus).unwrap();
        let exit = process.wait().await.unwrap();
        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
        assert_eq!(exit.stdout, "up\n");
        assert_eq!(exit.stderr, "oops\n");
    }
}
