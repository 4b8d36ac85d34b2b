//! Subprocess plumbing.
//!
//! Build tools are driven as external processes whose output is consumed
//! line-by-line as it arrives. Reader threads drain stdout and stderr into a
//! channel; the caller blocks on the channel, one suspension point per line,
//! until the process exits.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use thiserror::Error;

/// Errors from subprocess execution.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        source: io::Error,
    },

    #[error("I/O error while running {command}: {source}")]
    Io {
        command: String,
        source: io::Error,
    },

    #[error("{command} exited with status {code}")]
    Failed { command: String, code: i32 },
}

/// Which stream a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Output,
    Error,
}

impl OutputStream {
    /// 3-letter uppercase tag used as the log-line prefix.
    pub fn tag(&self) -> &'static str {
        match self {
            OutputStream::Output => "OUT",
            OutputStream::Error => "ERR",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Spawn `command` with `args` in `cwd` and forward every output line to
/// `on_line` as it arrives. Returns the process exit code once both streams
/// are drained.
pub fn stream_lines<F>(
    command: &Path,
    args: &[String],
    cwd: &Path,
    mut on_line: F,
) -> Result<i32, ShellError>
where
    F: FnMut(OutputStream, &str),
{
    let display = command.display().to_string();
    let mut child = Command::new(command)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ShellError::Spawn {
            command: display.clone(),
            source,
        })?;

    let (sender, receiver) = mpsc::channel();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_sender = sender.clone();
    let stdout_handle = thread::spawn(move || forward(stdout, OutputStream::Output, stdout_sender));
    let stderr_handle = thread::spawn(move || forward(stderr, OutputStream::Error, sender));

    // Iteration ends when both reader threads have dropped their senders.
    for (stream, line) in receiver {
        on_line(stream, &line);
    }

    let _ = stdout_handle.join();
    let _ = stderr_handle.join();

    let status = child.wait().map_err(|source| ShellError::Io {
        command: display,
        source,
    })?;
    Ok(status.code().unwrap_or(-1))
}

fn forward<R: Read>(
    pipe: Option<R>,
    stream: OutputStream,
    sender: mpsc::Sender<(OutputStream, String)>,
) {
    let Some(pipe) = pipe else { return };
    let reader = BufReader::new(pipe);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if sender.send((stream, line)).is_err() {
            break;
        }
    }
}

/// Run a command to completion with inherited-but-discarded output, failing
/// on a non-zero exit.
pub fn run(command: &str, args: &[String], cwd: &Path) -> Result<(), ShellError> {
    let status = Command::new(command)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| ShellError::Spawn {
            command: command.to_string(),
            source,
        })?;
    if !status.success() {
        return Err(ShellError::Failed {
            command: command.to_string(),
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

/// Compress `entry` (relative to `cwd`) into `archive` with `zip -r`.
///
/// zip follows symbolic links while recursing, so staged link trees are
/// stored as real directories.
pub fn zip_recursive(cwd: &Path, archive: &Path, entry: &str) -> Result<(), ShellError> {
    let args = vec![
        "-r".to_string(),
        archive.display().to_string(),
        entry.to_string(),
    ];
    run("zip", &args, cwd)
}

/// Last `count` lines of a text file, for failure diagnostics.
pub fn tail_lines(path: &Path, count: usize) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let lines = BufReader::new(file)
        .lines()
        .collect::<io::Result<Vec<String>>>()?;
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].to_vec())
}
