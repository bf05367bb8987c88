// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line followers for transcript and hook files.
//!
//! Local files are followed with a notify watcher plus a polling fallback,
//! reading only content appended since the last read. Sprite files are
//! followed through an ssh `tail -F` child process. Both deliver complete
//! lines over an mpsc channel and stop idempotently.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncBufReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::env;

/// Where to begin reading a followed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowFrom {
    /// Read the whole file from the beginning (hook files)
    Start,
    /// Read only lines appended after attach (transcripts)
    End,
}

/// Handle to a running follower. Stopping is idempotent; dropping stops.
pub struct FollowHandle {
    shutdown: Option<oneshot::Sender<()>>,
}

impl FollowHandle {
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for FollowHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Follow a local file, delivering each complete appended line.
pub fn follow_local(
    path: PathBuf,
    from: FollowFrom,
    line_tx: mpsc::Sender<String>,
) -> FollowHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(follow_local_loop(path, from, line_tx, shutdown_rx));
    FollowHandle {
        shutdown: Some(shutdown_tx),
    }
}

/// Follow a file on a sprite via `ssh ... tail -F`.
pub fn follow_sprite(
    host: &str,
    path: &str,
    from: FollowFrom,
    line_tx: mpsc::Sender<String>,
) -> FollowHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(follow_sprite_loop(
        host.to_string(),
        path.to_string(),
        from,
        line_tx,
        shutdown_rx,
    ));
    FollowHandle {
        shutdown: Some(shutdown_tx),
    }
}

async fn follow_local_loop(
    path: PathBuf,
    from: FollowFrom,
    line_tx: mpsc::Sender<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    // Wait for the file to appear; the provisioner normally touches it
    // before the agent starts, but remote filesystems can lag.
    loop {
        if path.exists() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(env::follow_wait_ms()) => {}
            _ = &mut shutdown_rx => return,
        }
    }

    let mut offset = match from {
        FollowFrom::Start => 0,
        FollowFrom::End => std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
    };

    // Emit anything already past the chosen offset before watching.
    for line in read_new_lines(&path, &mut offset) {
        if line_tx.send(line).await.is_err() {
            return;
        }
    }

    let (notify_tx, mut notify_rx) = mpsc::channel(32);
    let _watcher_guard = match create_file_watcher(&path, notify_tx) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "file watcher failed, polling only");
            None
        }
    };

    loop {
        tokio::select! {
            Some(_) = notify_rx.recv() => {
                for line in read_new_lines(&path, &mut offset) {
                    if line_tx.send(line).await.is_err() {
                        return;
                    }
                }
            }
            _ = tokio::time::sleep(env::follower_poll_ms()) => {
                for line in read_new_lines(&path, &mut offset) {
                    if line_tx.send(line).await.is_err() {
                        return;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                tracing::debug!(path = %path.display(), "follower shutdown requested");
                return;
            }
        }
    }
}

async fn follow_sprite_loop(
    host: String,
    path: String,
    from: FollowFrom,
    line_tx: mpsc::Sender<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let start_arg = match from {
        FollowFrom::Start => "+1",
        FollowFrom::End => "0",
    };
    let mut child = match Command::new("ssh")
        .args([
            "-o",
            "BatchMode=yes",
            &host,
            "--",
            "tail",
            "-n",
            start_arg,
            "-F",
            &path,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(%host, %path, error = %e, "sprite tail spawn failed");
            return;
        }
    };

    let Some(stdout) = child.stdout.take() else {
        return;
    };
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    // Pipe closed: ssh dropped or the sprite went away
                    Ok(None) | Err(_) => break,
                }
            }
            _ = &mut shutdown_rx => break,
        }
    }

    let _ = child.kill().await;
}

/// Read complete lines appended since `offset`, advancing it. A truncated
/// file resets the offset to the beginning.
fn read_new_lines(path: &Path, offset: &mut u64) -> Vec<String> {
    let Ok(file) = std::fs::File::open(path) else {
        return Vec::new();
    };
    let file_len = file.metadata().map(|m| m.len()).unwrap_or(0);
    if file_len < *offset {
        *offset = 0;
    }
    if file_len == *offset {
        return Vec::new();
    }

    let mut reader = BufReader::new(file);
    if reader.seek(SeekFrom::Start(*offset)).is_err() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if !line.ends_with('\n') {
                    // Partial line: leave it for the next read
                    break;
                }
                *offset += n as u64;
                let trimmed = line.trim_end_matches(['\n', '\r']);
                lines.push(trimmed.to_string());
            }
        }
    }
    lines
}

fn create_file_watcher(
    path: &Path,
    tx: mpsc::Sender<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if res.is_ok() {
            let _ = tx.blocking_send(());
        }
    })?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
#[path = "follow_tests.rs"]
mod tests;
