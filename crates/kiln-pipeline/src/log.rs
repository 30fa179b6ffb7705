use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One file's accumulated log buffer, handed to the consumer as a single unit
/// so it flushes without interleaving against another file's lines (§2, §4.1).
pub struct LogEntry {
    pub source: String,
    pub lines: String,
}

/// Spawns the side-channel log consumer: a single serial task draining
/// `rx` and emitting each entry as one grouped `tracing` event. Keeping this
/// off the worker pool is what gives the "never interleaved" guarantee —
/// there is exactly one writer.
pub fn spawn_log_consumer(mut rx: mpsc::Receiver<LogEntry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if entry.lines.is_empty() {
                continue;
            }
            tracing::info!(file = %entry.source, "{}", entry.lines);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_log_entries_are_skipped_without_panicking() {
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_log_consumer(rx);
        tx.send(LogEntry {
            source: "a.flac".to_string(),
            lines: String::new(),
        })
        .await
        .unwrap();
        tx.send(LogEntry {
            source: "b.flac".to_string(),
            lines: "probed ok".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
