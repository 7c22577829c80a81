//! Unit tests for fragmentation.

use std::num::NonZeroUsize;

use proptest::prelude::*;
use rstest::rstest;

use super::*;
use crate::{
    Digest,
    encoding,
    record::{ArtifactId, ChunkIndex, DeviceId, OriginTimestamp, Record, RecordKind},
};

fn id() -> ArtifactId { ArtifactId::new(DeviceId::new("cam-01"), OriginTimestamp::from_millis(42)) }

fn fragmenter(size: usize) -> Fragmenter {
    Fragmenter::new(NonZeroUsize::new(size).expect("non-zero chunk size"))
}

fn joined(batch: &TransferBatch) -> String {
    batch
        .chunks()
        .iter()
        .map(|chunk| chunk.chunk_payload.as_str())
        .collect()
}

#[rstest]
#[case::exact_multiple(b"abcdef".as_slice(), 4, 2)]
#[case::short_tail(b"abcdefg".as_slice(), 4, 3)]
#[case::single_chunk(b"abc".as_slice(), 3072, 1)]
#[case::one_char_chunks(b"a".as_slice(), 1, 4)]
fn splits_into_expected_chunks(#[case] artifact: &[u8], #[case] size: usize, #[case] total: u32) {
    let batch = fragmenter(size).fragment(id(), artifact).expect("fragment");

    assert_eq!(batch.header().total_chunks, total);
    assert_eq!(batch.len(), total as usize);
    assert_eq!(batch.header().chunk_size, size);
    assert_eq!(batch.header().artifact_size, artifact.len() as u64);
    assert_eq!(batch.encoded_len(), encoding::encoded_len(artifact.len()));
    assert!(batch.header().check_geometry().is_ok());
}

#[test]
fn chunks_carry_full_identifier_and_last_flag() {
    let batch = fragmenter(4).fragment(id(), b"hello world").expect("fragment");
    let chunks = batch.chunks();
    let last = chunks.len() - 1;

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.artifact_id(), id());
        assert_eq!(chunk.chunk_index, ChunkIndex::new(u32::try_from(i).expect("index")));
        assert_eq!(chunk.is_last, i == last);
        assert!(chunk.verify());
        assert!(chunk.chunk_payload.len() <= 4);
    }
    assert_eq!(batch.completion().artifact_digest, Digest::of(b"hello world"));
    assert_eq!(batch.completion().total_chunks, batch.header().total_chunks);
}

#[test]
fn rejects_empty_artifact() {
    let err = fragmenter(4).fragment(id(), b"").expect_err("empty");
    assert!(matches!(err, FragmentationError::EmptyArtifact));
}

#[test]
fn records_are_emitted_in_protocol_order() {
    let kinds: Vec<_> = fragmenter(4)
        .fragment(id(), b"abcdefgh")
        .expect("fragment")
        .into_records()
        .iter()
        .map(Record::kind)
        .collect();
    assert_eq!(
        kinds,
        [
            RecordKind::Header,
            RecordKind::Chunk,
            RecordKind::Chunk,
            RecordKind::Chunk,
            RecordKind::Completion,
        ]
    );
}

proptest! {
    #[test]
    fn chunks_reconstruct_artifact(
        artifact in prop::collection::vec(any::<u8>(), 1..2048),
        size in 1usize..512,
    ) {
        let batch = fragmenter(size).fragment(id(), &artifact).expect("fragment");
        let decoded = encoding::decode_lenient(&joined(&batch)).expect("decode");
        prop_assert_eq!(&decoded, &artifact);
        prop_assert!(batch.header().artifact_digest.matches(&decoded));
        prop_assert!(batch.chunks().iter().all(|c| !c.chunk_payload.is_empty()));
    }
}
