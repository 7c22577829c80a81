//! Unit tests for the transfer registry and reassembler.

use std::{
    num::NonZeroUsize,
    path::PathBuf,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use rstest::{fixture, rstest};

use super::*;
use crate::{
    Digest,
    fragment::Fragmenter,
    record::{
        ArtifactId,
        ChunkIndex,
        ChunkRecord,
        CompletionRecord,
        DeviceId,
        HeaderRecord,
        OriginTimestamp,
        Record,
        RecordError,
        TopicSet,
    },
    sink::{ArtifactSink, SinkError},
    transport::InboundMessage,
};

const CHUNK: usize = 4;
const TIMEOUT: Duration = Duration::from_secs(60);

fn limits() -> RegistryLimits {
    RegistryLimits {
        chunk_size: NonZeroUsize::new(CHUNK).expect("non-zero"),
        max_pending: NonZeroUsize::new(4).expect("non-zero"),
        max_artifact_size: NonZeroUsize::new(1024).expect("non-zero"),
        transfer_timeout: TIMEOUT,
        completed_history: 2,
    }
}

fn artifact_id(device: &str, ts: u64) -> ArtifactId {
    ArtifactId::new(DeviceId::new(device), OriginTimestamp::from_millis(ts))
}

fn parts(id: ArtifactId, bytes: &[u8]) -> (HeaderRecord, Vec<ChunkRecord>, CompletionRecord) {
    Fragmenter::new(limits().chunk_size)
        .fragment(id, bytes)
        .expect("fragment")
        .into_parts()
}

#[fixture]
fn registry() -> TransferRegistry { TransferRegistry::new(limits()) }

fn verified(outcome: ChunkOutcome) -> VerifiedArtifact {
    match outcome {
        ChunkOutcome::Assembled(AssemblyOutcome::Verified(artifact)) => artifact,
        other => panic!("expected a verified artifact, got {other:?}"),
    }
}

#[rstest]
#[case::in_order(vec![0, 1, 2, 3])]
#[case::reversed(vec![3, 2, 1, 0])]
#[case::shuffled(vec![2, 0, 3, 1])]
fn assembles_in_any_order(registry: TransferRegistry, #[case] order: Vec<usize>) {
    let payload = b"abcdefghijk";
    let (header, chunks, _) = parts(artifact_id("cam", 1), payload);
    assert_eq!(chunks.len(), order.len());
    registry.insert_header(header).expect("header");

    let (last, rest) = order.split_last().expect("non-empty order");
    for &i in rest {
        assert!(matches!(
            registry.insert_chunk(chunks[i].clone()),
            Ok(ChunkOutcome::Stored(_))
        ));
    }
    let outcome = registry.insert_chunk(chunks[*last].clone()).expect("chunk");
    let artifact = verified(outcome);
    assert_eq!(artifact.bytes, payload);
    assert_eq!(artifact.digest, Digest::of(payload));
    assert_eq!(registry.pending_len(), 0);
}

#[rstest]
fn duplicate_chunk_changes_nothing(registry: TransferRegistry) {
    let (header, chunks, _) = parts(artifact_id("cam", 1), b"abcdefgh");
    let id = header.artifact_id();
    registry.insert_header(header).expect("header");
    registry.insert_chunk(chunks[0].clone()).expect("first");

    let err = registry.insert_chunk(chunks[0].clone()).expect_err("duplicate");
    assert!(matches!(err, ReassemblyError::DuplicateChunk { index, .. } if index == ChunkIndex::zero()));
    assert!(err.is_duplicate());
    assert_eq!(registry.progress(&id).map(|p| p.received), Some(1));
}

#[rstest]
fn tampered_chunk_is_not_stored(registry: TransferRegistry) {
    let (header, mut chunks, _) = parts(artifact_id("cam", 1), b"abcdefgh");
    let id = header.artifact_id();
    registry.insert_header(header).expect("header");
    chunks[1].chunk_payload = "XXXX".to_owned();

    let err = registry.insert_chunk(chunks[1].clone()).expect_err("tampered");
    assert!(matches!(err, ReassemblyError::ChunkDigestMismatch { .. }));
    assert_eq!(registry.progress(&id).map(|p| p.received), Some(0));
}

#[rstest]
#[case::oversized_first(0, "A".repeat(4 * 1024 * 1024), 4)]
#[case::short_first(0, "YWJ".to_owned(), 4)]
#[case::long_last(1, "ZA====".to_owned(), 4)]
#[case::truncated_last(1, "Z".to_owned(), 4)]
fn chunk_payload_must_fit_header_geometry(
    registry: TransferRegistry,
    #[case] index: u32,
    #[case] payload: String,
    #[case] expected_len: usize,
) {
    let (header, _, _) = parts(artifact_id("cam", 1), b"abcd");
    let id = header.artifact_id();
    registry.insert_header(header).expect("header");
    let found_len = payload.len();

    let err = registry
        .insert_chunk(ChunkRecord::new(&id, ChunkIndex::new(index), 2, payload))
        .expect_err("payload length");
    assert!(matches!(
        err,
        ReassemblyError::PayloadLength { expected, found, .. }
            if expected == expected_len && found == found_len
    ));
    assert_eq!(err.reason(), "payload_length");
    assert_eq!(registry.progress(&id).map(|p| p.received), Some(0));
}

#[rstest]
fn unpadded_final_chunk_is_accepted(registry: TransferRegistry) {
    let (header, chunks, _) = parts(artifact_id("cam", 1), b"abcd");
    let id = header.artifact_id();
    registry.insert_header(header).expect("header");
    registry.insert_chunk(chunks[0].clone()).expect("first");

    let stripped = chunks[1].chunk_payload.trim_end_matches('=').to_owned();
    assert_eq!(stripped.len(), 2);
    let last = ChunkRecord::new(&id, ChunkIndex::new(1), 2, stripped);
    let artifact = verified(registry.insert_chunk(last).expect("last"));
    assert_eq!(artifact.bytes, b"abcd");
}

#[rstest]
fn tampered_last_chunk_with_recomputed_digest_fails_assembly(registry: TransferRegistry) {
    let (header, mut chunks, _) = parts(artifact_id("cam", 1), b"abcdefghi");
    let id = header.artifact_id();
    registry.insert_header(header).expect("header");
    let last = chunks.pop().expect("chunks");
    for chunk in chunks {
        registry.insert_chunk(chunk).expect("chunk");
    }

    let flipped: String = last.chunk_payload.chars().rev().collect();
    assert_ne!(flipped, last.chunk_payload);
    let forged = ChunkRecord::new(&id, last.chunk_index, last.total_chunks, flipped);
    assert!(forged.verify());

    let outcome = registry.insert_chunk(forged).expect("chunk digest matches");
    assert!(matches!(
        outcome,
        ChunkOutcome::Assembled(AssemblyOutcome::Failed {
            error: AssemblyError::DigestMismatch { .. },
            ..
        })
    ));
    assert!(!registry.contains(&id));
    assert_eq!(registry.status().failed_total, 1);
}

#[rstest]
fn chunk_without_header_is_dropped(registry: TransferRegistry) {
    let (_, chunks, completion) = parts(artifact_id("cam", 1), b"abc");
    assert!(matches!(
        registry.insert_chunk(chunks[0].clone()),
        Err(ReassemblyError::MissingHeader { .. })
    ));
    assert!(matches!(
        registry.try_assemble(&completion),
        Err(ReassemblyError::MissingHeader { .. })
    ));
    assert_eq!(registry.pending_len(), 0);
}

#[rstest]
fn duplicate_header_keeps_first_task(registry: TransferRegistry) {
    let (header, chunks, _) = parts(artifact_id("cam", 1), b"abcdefgh");
    let id = header.artifact_id();
    registry.insert_header(header.clone()).expect("header");
    registry.insert_chunk(chunks[0].clone()).expect("chunk");

    assert!(matches!(
        registry.insert_header(header),
        Err(ReassemblyError::DuplicateHeader { .. })
    ));
    assert_eq!(registry.progress(&id).map(|p| p.received), Some(1));
}

#[rstest]
fn rejects_headers_breaking_limits(registry: TransferRegistry) {
    let (mut header, _, _) = parts(artifact_id("cam", 1), b"abcdefgh");
    header.chunk_size = 8;
    header.total_chunks = 2;
    assert!(matches!(
        registry.insert_header(header),
        Err(ReassemblyError::ChunkSizeMismatch { declared: 8, .. })
    ));

    let big = vec![0u8; 2048];
    let (header, _, _) = parts(artifact_id("cam", 2), &big);
    assert!(matches!(
        registry.insert_header(header),
        Err(ReassemblyError::ArtifactTooLarge { attempted: 2048, .. })
    ));

    let (mut header, _, _) = parts(artifact_id("cam", 3), b"abcdefgh");
    header.total_chunks = 0;
    assert!(matches!(
        registry.insert_header(header),
        Err(ReassemblyError::Record(RecordError::EmptyTransfer { .. }))
    ));
    assert_eq!(registry.pending_len(), 0);
}

#[rstest]
fn refuses_headers_when_full(registry: TransferRegistry) {
    for ts in 0..4 {
        let (header, _, _) = parts(artifact_id("cam", ts), b"abc");
        registry.insert_header(header).expect("header");
    }
    let (header, _, _) = parts(artifact_id("cam", 99), b"abc");
    assert!(matches!(
        registry.insert_header(header),
        Err(ReassemblyError::RegistryFull { .. })
    ));
    assert_eq!(registry.pending_len(), 4);
}

#[rstest]
fn chunk_disagreeing_with_header_is_rejected(registry: TransferRegistry) {
    let id = artifact_id("cam", 1);
    let (header, chunks, _) = parts(id.clone(), b"abcdefgh");
    registry.insert_header(header).expect("header");

    let mut wrong_total = chunks[0].clone();
    wrong_total.total_chunks = 9;
    assert!(matches!(
        registry.insert_chunk(wrong_total),
        Err(ReassemblyError::TotalMismatch { expected: 3, found: 9, .. })
    ));

    let beyond = ChunkRecord::new(&id, ChunkIndex::new(5), 3, "QUJD".to_owned());
    assert!(matches!(
        registry.insert_chunk(beyond),
        Err(ReassemblyError::IndexOutOfRange { total: 3, .. })
    ));

    let mut early_last = chunks[0].clone();
    early_last.is_last = true;
    assert!(matches!(
        registry.insert_chunk(early_last),
        Err(ReassemblyError::LastFlagMismatch { .. })
    ));
    assert_eq!(registry.progress(&id).map(|p| p.received), Some(0));
}

#[rstest]
fn completion_before_chunks_waits(registry: TransferRegistry) {
    let (header, chunks, completion) = parts(artifact_id("cam", 1), b"abcdefgh");
    registry.insert_header(header).expect("header");
    let (last, rest) = chunks.split_last().expect("chunks");
    for chunk in rest {
        registry.insert_chunk(chunk.clone()).expect("chunk");
    }

    let outcome = registry.try_assemble(&completion).expect("completion");
    assert_eq!(
        outcome,
        CompletionOutcome::Pending {
            progress: ChunkProgress {
                received: rest.len(),
                total: 3,
            },
            missing: vec![last.chunk_index],
        }
    );
    let artifact = verified(registry.insert_chunk(last.clone()).expect("last"));
    assert_eq!(artifact.bytes, b"abcdefgh");
}

#[rstest]
fn completion_disagreeing_with_header_is_dropped(registry: TransferRegistry) {
    let (header, _, completion) = parts(artifact_id("cam", 1), b"abcdefgh");
    registry.insert_header(header).expect("header");

    let mut wrong_digest = completion.clone();
    wrong_digest.artifact_digest = Digest::of(b"other");
    assert!(matches!(
        registry.try_assemble(&wrong_digest),
        Err(ReassemblyError::CompletionDigestMismatch { .. })
    ));

    let mut wrong_total = completion;
    wrong_total.total_chunks = 7;
    assert!(matches!(
        registry.try_assemble(&wrong_total),
        Err(ReassemblyError::TotalMismatch { .. })
    ));
    assert_eq!(registry.pending_len(), 1);
}

#[rstest]
fn corrupted_artifact_fails_and_is_removed(registry: TransferRegistry) {
    let (mut header, chunks, _) = parts(artifact_id("cam", 1), b"abc");
    header.artifact_digest = Digest::of(b"abd");
    let id = header.artifact_id();
    registry.insert_header(header).expect("header");

    let outcome = registry.insert_chunk(chunks[0].clone()).expect("chunk");
    assert!(matches!(
        outcome,
        ChunkOutcome::Assembled(AssemblyOutcome::Failed {
            error: AssemblyError::DigestMismatch { .. },
            ..
        })
    ));
    assert!(!registry.contains(&id));
    assert_eq!(registry.status().failed_total, 1);
}

#[rstest]
fn undecodable_text_fails_assembly(registry: TransferRegistry) {
    let id = artifact_id("cam", 1);
    let header = HeaderRecord {
        device_id: id.device_id().clone(),
        origin_timestamp: id.origin_timestamp(),
        artifact_digest: Digest::of(b"abc"),
        total_chunks: 1,
        chunk_size: CHUNK,
        artifact_size: 3,
    };
    registry.insert_header(header).expect("header");
    let chunk = ChunkRecord::new(&id, ChunkIndex::zero(), 1, "!!!!".to_owned());

    assert!(matches!(
        registry.insert_chunk(chunk),
        Ok(ChunkOutcome::Assembled(AssemblyOutcome::Failed {
            error: AssemblyError::Decode { .. },
            ..
        }))
    ));
}

#[rstest]
fn interleaved_transfers_from_one_device_stay_apart(registry: TransferRegistry) {
    let (h1, c1, _) = parts(artifact_id("cam", 1), b"first-frame");
    let (h2, c2, _) = parts(artifact_id("cam", 2), b"second-frame");
    registry.insert_header(h1).expect("h1");
    registry.insert_header(h2).expect("h2");

    let mut results = Vec::new();
    let longest = c1.len().max(c2.len());
    for i in 0..longest {
        for chunks in [&c2, &c1] {
            if let Some(chunk) = chunks.get(i)
                && let ChunkOutcome::Assembled(AssemblyOutcome::Verified(a)) =
                    registry.insert_chunk(chunk.clone()).expect("chunk")
            {
                results.push(a);
            }
        }
    }
    results.sort_by(|a, b| a.id.cmp(&b.id));
    let bytes: Vec<&[u8]> = results.iter().map(|a| a.bytes.as_slice()).collect();
    assert_eq!(bytes, [&b"first-frame"[..], &b"second-frame"[..]]);
}

#[rstest]
fn sweep_evicts_at_timeout(registry: TransferRegistry) {
    let start = Instant::now();
    let (header, chunks, _) = parts(artifact_id("cam", 1), b"abcdefgh");
    let id = registry.insert_header_at(header, start).expect("header");
    registry.insert_chunk(chunks[0].clone()).expect("chunk");

    let almost = start + TIMEOUT - Duration::from_millis(1);
    assert!(registry.sweep_expired_at(almost).is_empty());
    assert!(registry.contains(&id));

    let evicted = registry.sweep_expired_at(start + TIMEOUT);
    assert_eq!(
        evicted,
        vec![EvictedTransfer {
            id: id.clone(),
            progress: ChunkProgress {
                received: 1,
                total: 3,
            },
            age: TIMEOUT,
        }]
    );
    assert!(matches!(
        registry.insert_chunk(chunks[1].clone()),
        Err(ReassemblyError::MissingHeader { .. })
    ));
    assert_eq!(registry.status().evicted_total, 1);
}

#[rstest]
fn sweep_leaves_younger_transfers(registry: TransferRegistry) {
    let start = Instant::now();
    let (old, _, _) = parts(artifact_id("cam", 1), b"abc");
    let (young, _, _) = parts(artifact_id("cam", 2), b"abc");
    registry.insert_header_at(old, start).expect("old");
    registry
        .insert_header_at(young, start + Duration::from_secs(30))
        .expect("young");

    let evicted = registry.sweep_expired_at(start + TIMEOUT);
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].id, artifact_id("cam", 1));
    assert!(registry.contains(&artifact_id("cam", 2)));
}

#[rstest]
fn status_reports_pending_and_bounded_history(registry: TransferRegistry) {
    let start = Instant::now();
    let (b, _, _) = parts(artifact_id("cam-b", 1), b"abc");
    let (a, _, _) = parts(artifact_id("cam-a", 1), b"abc");
    registry.insert_header_at(b, start).expect("b");
    registry.insert_header_at(a, start).expect("a");

    for ts in 0..3 {
        registry.record_completed(CompletedArtifact {
            id: artifact_id("done", ts),
            location: PathBuf::from(format!("/tmp/{ts}.jpg")),
            size: 3,
            digest: Digest::of(b"abc"),
            completed_at: chrono::Local::now(),
        });
    }
    registry.record_failed();

    let status = registry.status_at(start + Duration::from_secs(5));
    let pending: Vec<_> = status.pending.iter().map(|p| p.id.to_string()).collect();
    assert_eq!(pending, ["cam-a_1", "cam-b_1"]);
    assert!(status.pending.iter().all(|p| p.age == Duration::from_secs(5)));
    let recent: Vec<_> = status.recent.iter().map(|c| c.id.clone()).collect();
    assert_eq!(recent, [artifact_id("done", 1), artifact_id("done", 2)]);
    assert_eq!(status.completed_total, 3);
    assert_eq!(status.failed_total, 1);
}

#[test]
fn concurrent_chunks_assemble_exactly_once() {
    let registry = Arc::new(TransferRegistry::new(limits()));
    let payload: Vec<u8> = (0u8..=200).collect();
    let (header, chunks, _) = parts(artifact_id("cam", 1), &payload);
    registry.insert_header(header).expect("header");

    let assembled = thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .chunks(chunks.len().div_ceil(8))
            .map(|slice| {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    slice
                        .iter()
                        .filter_map(|chunk| match registry.insert_chunk(chunk.clone()) {
                            Ok(ChunkOutcome::Assembled(AssemblyOutcome::Verified(a))) => Some(a),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread"))
            .collect::<Vec<_>>()
    });

    assert_eq!(assembled.len(), 1);
    assert_eq!(assembled[0].bytes, payload);
    assert_eq!(registry.pending_len(), 0);
}

#[test]
fn concurrent_sweep_and_chunks_never_assemble_twice() {
    let registry = Arc::new(TransferRegistry::new(limits()));
    let (header, chunks, _) = parts(artifact_id("cam", 1), b"abcdefghijklmnop");
    let start = Instant::now();
    registry.insert_header_at(header, start).expect("header");

    let (inserted, evicted) = thread::scope(|scope| {
        let feeder = {
            let registry = Arc::clone(&registry);
            let chunks = &chunks;
            scope.spawn(move || {
                chunks
                    .iter()
                    .filter(|chunk| {
                        matches!(
                            registry.insert_chunk((*chunk).clone()),
                            Ok(ChunkOutcome::Assembled(_))
                        )
                    })
                    .count()
            })
        };
        let sweeper = {
            let registry = Arc::clone(&registry);
            scope.spawn(move || registry.sweep_expired_at(start + TIMEOUT).len())
        };
        (
            feeder.join().expect("feeder"),
            sweeper.join().expect("sweeper"),
        )
    });

    assert_eq!(inserted + evicted, 1);
    assert_eq!(registry.pending_len(), 0);
}

#[derive(Default)]
struct RecordingSink {
    stored: Mutex<Vec<(ArtifactId, Vec<u8>)>>,
    refuse: bool,
}

#[async_trait]
impl ArtifactSink for RecordingSink {
    async fn store(&self, id: &ArtifactId, bytes: &[u8]) -> Result<PathBuf, SinkError> {
        if self.refuse {
            return Err(SinkError::Rejected {
                id: id.clone(),
                reason: "disk full".to_owned(),
            });
        }
        self.stored
            .lock()
            .expect("sink lock")
            .push((id.clone(), bytes.to_vec()));
        Ok(PathBuf::from(format!("/mem/{id}")))
    }
}

fn reassembler(sink: Arc<RecordingSink>) -> Reassembler {
    Reassembler::new(
        Arc::new(TransferRegistry::new(limits())),
        sink,
        TopicSet::new("esp32/camera"),
    )
}

fn message(topics: &TopicSet, record: impl Into<Record>) -> InboundMessage {
    let record = record.into();
    let payload = record.to_bytes().expect("encode");
    InboundMessage::new(topics.topic(record.kind()), Bytes::from(payload))
}

#[tokio::test]
async fn dispatch_delivers_artifact_and_emits_event() {
    let sink = Arc::new(RecordingSink::default());
    let reassembler = reassembler(Arc::clone(&sink));
    let mut events = reassembler.subscribe();
    let topics = reassembler.topics().clone();
    let (header, chunks, completion) = parts(artifact_id("cam", 5), b"jpeg-bytes");

    assert!(matches!(
        reassembler.dispatch(&message(&topics, header)).await,
        Disposition::Started(_)
    ));
    let mut last = None;
    for chunk in chunks.into_iter().rev() {
        last = Some(reassembler.dispatch(&message(&topics, chunk)).await);
    }
    let Some(Disposition::Delivered(completed)) = last else {
        panic!("expected delivery");
    };
    assert_eq!(completed.size, 10);
    assert_eq!(completed.location, PathBuf::from("/mem/cam_5"));

    // Completion after assembly finds no task.
    assert!(matches!(
        reassembler.dispatch(&message(&topics, completion)).await,
        Disposition::Dropped(ReassemblyError::MissingHeader { .. })
    ));

    let stored = sink.stored.lock().expect("sink lock").clone();
    assert_eq!(stored, vec![(artifact_id("cam", 5), b"jpeg-bytes".to_vec())]);
    assert_eq!(
        events.recv().await.expect("event"),
        TransferEvent::Completed(completed)
    );
    assert_eq!(reassembler.registry().status().completed_total, 1);
}

#[tokio::test]
async fn dispatch_drops_unknown_topics_and_bad_payloads() {
    let reassembler = reassembler(Arc::new(RecordingSink::default()));

    let stray = InboundMessage::new("esp32/other/chunk", Bytes::from_static(b"{}"));
    assert!(matches!(
        reassembler.dispatch(&stray).await,
        Disposition::Dropped(ReassemblyError::Record(RecordError::UnknownTopic { .. }))
    ));

    let garbage = InboundMessage::new("esp32/camera/chunk", Bytes::from_static(b"not json"));
    assert!(matches!(
        reassembler.dispatch(&garbage).await,
        Disposition::Dropped(ReassemblyError::Record(RecordError::Malformed { .. }))
    ));

    let (header, _, _) = parts(artifact_id("cam", 1), b"abc");
    let wrong_topic = InboundMessage::new(
        "esp32/camera/chunk",
        Record::from(header).to_bytes().expect("encode"),
    );
    assert!(matches!(
        reassembler.dispatch(&wrong_topic).await,
        Disposition::Dropped(ReassemblyError::Record(RecordError::KindMismatch { .. }))
    ));
    assert_eq!(reassembler.registry().pending_len(), 0);
}

#[tokio::test]
async fn sink_failure_marks_transfer_failed() {
    let sink = Arc::new(RecordingSink {
        refuse: true,
        ..RecordingSink::default()
    });
    let reassembler = reassembler(sink);
    let mut events = reassembler.subscribe();
    let (header, chunks, _) = parts(artifact_id("cam", 1), b"abc");

    reassembler.handle_header(header);
    let disposition = reassembler.handle_chunk(chunks[0].clone()).await;
    assert!(matches!(
        disposition,
        Disposition::Failed {
            error: DeliveryError::Sink(SinkError::Rejected { .. }),
            ..
        }
    ));
    assert!(matches!(
        events.recv().await.expect("event"),
        TransferEvent::Failed { .. }
    ));
    let status = reassembler.registry().status();
    assert_eq!(status.failed_total, 1);
    assert_eq!(status.completed_total, 0);
    assert!(status.pending.is_empty());
}
