//! Child-process helpers shared by the backends

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{ExportError, ExportResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a finished command left behind
pub(super) struct Finished {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn `cmd`, collect its output and kill it if it outlives `timeout`
pub(super) fn run_with_timeout(
    mut cmd: Command,
    program: &str,
    timeout: Duration,
) -> ExportResult<Finished> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| ExportError::Spawn {
        program: program.to_string(),
        source,
    })?;

    // Drain pipes on their own threads so a chatty child cannot block
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_timeout(&mut child, timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExportError::Timeout(program.to_string(), timeout.as_secs()));
        }
    };

    Ok(Finished {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

/// Poll until the child exits. `None` once `timeout` has passed.
pub(super) fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> ExportResult<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            text = String::from_utf8_lossy(&bytes).into_owned();
        }
        text
    })
}
