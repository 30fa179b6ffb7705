use std::sync::Arc;

use kiln_core::FileRecord;
use kiln_pipeline::{Stage, StageWorker};
use kiln_probe::Transcoder;
use kiln_transform::CoverDedupSet;

/// The Transformer stage (§4.6): materializes every track of a `FileRecord`
/// against the filesystem, in place, and returns the record unchanged so it
/// can still be logged or indexed downstream.
pub struct TransformerStage {
    pub worker_count: usize,
    pub transcoder: Arc<Transcoder>,
    pub cover_dedup: Arc<CoverDedupSet>,
}

impl Stage for TransformerStage {
    type Input = FileRecord;
    type Output = FileRecord;
    type Worker = TransformerWorker;

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn spawn_worker(&self) -> TransformerWorker {
        TransformerWorker {
            transcoder: self.transcoder.clone(),
            cover_dedup: self.cover_dedup.clone(),
        }
    }
}

pub struct TransformerWorker {
    transcoder: Arc<Transcoder>,
    cover_dedup: Arc<CoverDedupSet>,
}

impl StageWorker for TransformerWorker {
    type Input = FileRecord;
    type Output = FileRecord;

    async fn run(&mut self, mut record: FileRecord) -> FileRecord {
        let multi_track = record.tracks.len() > 1;
        for track in &mut record.tracks {
            let result = kiln_transform::materialize_track(
                &self.transcoder,
                &self.cover_dedup,
                &record.input,
                &mut track.output,
                track.status,
                multi_track,
            )
            .await;
            if let Err(source) = result {
                record.log_line(format!("materialization failed: {source}"));
            }
        }
        record
    }
}
