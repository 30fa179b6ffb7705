use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// One pipeline stage: a worker-count policy plus a per-worker constructor.
/// Workers are built once per worker slot, not once per record, so they can
/// hold long-lived state (an `Arc` to the shared resolver or sandbox) the way
/// the analyzer needs (§4.1, §4.5). `Input`/`Output` are allowed to differ —
/// the Analyzer turns a `PathBuf` into a `FileRecord`; the Transformer maps a
/// `FileRecord` onto itself.
pub trait Stage: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;
    type Worker: StageWorker<Input = Self::Input, Output = Self::Output>;

    /// Default worker count: the number of online cores, matching the
    /// analyzer's "N = online cores" default (§2).
    fn worker_count(&self) -> usize {
        num_cpus::get().max(1)
    }

    fn spawn_worker(&self) -> Self::Worker;
}

/// A stage's per-worker unit of execution: one record in, one record out.
pub trait StageWorker: Send + 'static {
    type Input;
    type Output;

    fn run(&mut self, item: Self::Input) -> impl Future<Output = Self::Output> + Send;
}

/// Wires `stage` between a bounded input channel and a freshly created bounded
/// output channel. `stage.worker_count()` tasks share the input receiver
/// behind a mutex and race to pull the next record; each worker owns its own
/// constructed `StageWorker` for the lifetime of the stage. The output
/// channel's capacity is the worker count, matching the intermediate-queue
/// sizing rule in §5 (capacity = producer worker count).
pub fn run_stage<S>(stage: Arc<S>, input: mpsc::Receiver<S::Input>) -> mpsc::Receiver<S::Output>
where
    S: Stage,
{
    let worker_count = stage.worker_count();
    let (out_tx, out_rx) = mpsc::channel(worker_count);
    let input = Arc::new(Mutex::new(input));

    for _ in 0..worker_count {
        let input = input.clone();
        let out_tx = out_tx.clone();
        let mut worker = stage.spawn_worker();
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut guard = input.lock().await;
                    guard.recv().await
                };
                let Some(item) = next else {
                    break;
                };
                let processed = worker.run(item).await;
                if out_tx.send(processed).await.is_err() {
                    break;
                }
            }
        });
    }

    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl Stage for Doubler {
        type Input = u32;
        type Output = u32;
        type Worker = DoublerWorker;

        fn worker_count(&self) -> usize {
            4
        }

        fn spawn_worker(&self) -> DoublerWorker {
            DoublerWorker
        }
    }

    struct DoublerWorker;

    impl StageWorker for DoublerWorker {
        type Input = u32;
        type Output = u32;

        async fn run(&mut self, item: u32) -> u32 {
            item * 2
        }
    }

    struct Stringify;

    impl Stage for Stringify {
        type Input = u32;
        type Output = String;
        type Worker = StringifyWorker;

        fn worker_count(&self) -> usize {
            2
        }

        fn spawn_worker(&self) -> StringifyWorker {
            StringifyWorker
        }
    }

    struct StringifyWorker;

    impl StageWorker for StringifyWorker {
        type Input = u32;
        type Output = String;

        async fn run(&mut self, item: u32) -> String {
            item.to_string()
        }
    }

    #[tokio::test]
    async fn stage_processes_every_record_exactly_once() {
        let (tx, rx) = mpsc::channel(16);
        for n in 0..20u32 {
            tx.send(n).await.unwrap();
        }
        drop(tx);

        let mut out_rx = run_stage(Arc::new(Doubler), rx);
        let mut results = Vec::new();
        while let Some(v) = out_rx.recv().await {
            results.push(v);
        }
        results.sort_unstable();

        let expected: Vec<u32> = (0..20u32).map(|n| n * 2).collect();
        assert_eq!(results, expected);
    }

    #[tokio::test]
    async fn stage_input_and_output_types_may_differ() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(7).await.unwrap();
        drop(tx);

        let mut out_rx = run_stage(Arc::new(Stringify), rx);
        assert_eq!(out_rx.recv().await, Some("7".to_string()));
    }
}
