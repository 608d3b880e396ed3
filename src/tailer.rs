/// Tails the kill-feed file, emitting new lines as the server appends them.
///
/// Uses the `notify` crate to detect file modifications, then reads from the
/// last known byte offset. Only complete (newline-terminated) lines are
/// emitted; a half-written line is picked up on the next change.
///
/// Rotation handling: if the file shrank since the last read (truncated or
/// recreated by the server), reading restarts from byte 0.
///
/// Blocking — run it on a dedicated thread (`spawn_blocking`).
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

pub struct TailerState {
    path:     PathBuf,
    position: u64,
}

impl TailerState {
    fn new(path: PathBuf) -> Self {
        Self { path, position: 0 }
    }

    /// Sends every complete line past the saved offset. Returns false once
    /// the receiver is gone.
    fn read_new_lines(&mut self, tx: &Sender<String>) -> Result<bool> {
        let file_len = match std::fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(_) => return Ok(true), // Feed not created yet — wait
        };

        if file_len < self.position {
            tracing::info!("Kill feed rotation detected — restarting from byte 0");
            self.position = 0;
        }
        if file_len == self.position {
            return Ok(true);
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(file);

        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 || !line.ends_with('\n') {
                break; // EOF or partial line
            }
            self.position += read as u64;

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            if tx.blocking_send(trimmed.to_owned()).is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub fn run(feed_path: PathBuf, tx: Sender<String>) -> Result<()> {
    tracing::info!("Tailer starting: {:?}", feed_path);

    let watch_dir = feed_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."))
        .to_path_buf();

    let (fs_tx, fs_rx) = std_mpsc::channel::<notify::Result<Event>>();

    // Small poll interval as fallback for platforms without native events
    let config = notify::Config::default().with_poll_interval(Duration::from_millis(500));

    let mut watcher = RecommendedWatcher::new(fs_tx, config)?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    let mut state = TailerState::new(feed_path.clone());

    // Initial read — pick up lines written before we started
    if !state.read_new_lines(&tx)? {
        return Ok(());
    }

    loop {
        match fs_rx.recv() {
            Ok(Ok(Event { kind: EventKind::Modify(_) | EventKind::Create(_), paths, .. })) => {
                if paths.iter().any(|p| p.ends_with(feed_path.file_name().unwrap_or_default())) {
                    match state.read_new_lines(&tx) {
                        Ok(true) => {}
                        Ok(false) => break, // Pipeline shutting down
                        Err(e) => tracing::warn!("Tailer read error: {}", e),
                    }
                }
            }
            Ok(Ok(_)) => {} // Access / remove events — ignore
            Ok(Err(e)) => tracing::error!("Watcher error: {}", e),
            Err(_) => {
                tracing::warn!("Watcher channel closed — tailer exiting");
                break;
            }
        }
    }
    Ok(())
}
