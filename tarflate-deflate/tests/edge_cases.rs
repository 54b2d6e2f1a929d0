//! Edge case tests for streaming DEFLATE.

use tarflate_core::{
    Codec, ConstBufferSeq, DynamicBuffer, FlushMode, MutableBufferSeq, TarflateError,
    TransformReader, TransformWriter, transform,
};
use tarflate_deflate::{Deflater, Inflater, deflate, inflate};
use std::io::{Read, Write};

fn text(size: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(size)
        .collect()
}

/// Mixed data: text runs interleaved with pseudo-random bytes.
fn mixed(size: usize) -> Vec<u8> {
    let mut state = 0x2545_F491u32;
    (0..size)
        .map(|i| {
            if (i / 1000) % 2 == 0 {
                b"lorem ipsum dolor sit amet "[i % 27]
            } else {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            }
        })
        .collect()
}

#[test]
fn test_empty_input() {
    let compressed = deflate(b"", 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), b"");
}

#[test]
fn test_single_byte() {
    let compressed = deflate(b"A", 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), b"A");
}

#[test]
fn test_all_zeros() {
    let input = vec![0u8; 1000];
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
    assert!(compressed.len() < input.len() / 10);
}

#[test]
fn test_max_match_length() {
    let input = vec![42u8; 258 * 10];
    let compressed = deflate(&input, 9).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_every_level() {
    let input = mixed(100_000);
    for level in 0..=9 {
        let compressed = deflate(&input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input, "level {level}");
    }
}

#[test]
fn test_large_input() {
    let input = text(1024 * 1024 + 17);
    let compressed = deflate(&input, 5).unwrap();
    assert!(compressed.len() < input.len() / 20);
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_long_distance_match() {
    let mut input = text(100);
    input.extend(std::iter::repeat_n(b'x', 32_000));
    input.extend(text(100));
    let compressed = deflate(&input, 9).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_hello_into_one_buffer() {
    let compressed = deflate(b"Hello, DEFLATE!", 6).unwrap();
    let mut inflater = Inflater::new();
    let mut out = [0u8; 50];
    let mut input = compressed.as_slice();
    let result = transform(&mut inflater, &mut out.as_mut_slice(), &mut input, FlushMode::Finish)
        .unwrap();

    assert!(result.done);
    assert_eq!(result.bytes_read, compressed.len());
    assert_eq!(&out[..result.bytes_written], b"Hello, DEFLATE!");
}

#[test]
fn test_hello_into_buffer_sequence() {
    let compressed = deflate(b"Hello, DEFLATE!", 6).unwrap();
    let mut inflater = Inflater::new();
    let mut storage = [[0u8; 10]; 5];
    let mut output = MutableBufferSeq::new(storage.iter_mut().map(|b| b.as_mut_slice()));
    let mut input = compressed.as_slice();
    let result = transform(&mut inflater, &mut output, &mut input, FlushMode::Finish).unwrap();

    assert!(result.done);
    assert_eq!(result.bytes_written, 15);
    let flat: Vec<u8> = storage.concat();
    assert_eq!(&flat[..15], b"Hello, DEFLATE!");
}

#[test]
fn test_fragmented_input_and_output() {
    let input = mixed(50_000);
    let compressed = deflate(&input, 6).unwrap();

    let mut inflater = Inflater::new();
    let mut sink = DynamicBuffer::new();
    let mut fragments = ConstBufferSeq::chunked(&compressed, 10);
    let result = transform(&mut inflater, &mut sink, &mut fragments, FlushMode::Finish).unwrap();
    assert!(result.done);
    assert_eq!(sink.data(), input.as_slice());

    // One byte of output room per call.
    let mut inflater = Inflater::new();
    let mut remaining = compressed.as_slice();
    let mut decoded = Vec::new();
    while !inflater.is_done() {
        let mut byte = [0u8; 1];
        let step = inflater
            .transform_chunk(&mut byte, remaining, FlushMode::Finish)
            .unwrap();
        remaining = &remaining[step.bytes_read..];
        decoded.extend_from_slice(&byte[..step.bytes_written]);
    }
    assert_eq!(decoded, input);
}

#[test]
fn test_compressor_with_tiny_output() {
    let input = mixed(20_000);
    let mut deflater = Deflater::new(6);
    let mut remaining = input.as_slice();
    let mut compressed = Vec::new();
    let mut out = [0u8; 7];
    let mut read = 0;

    while !deflater.is_done() {
        let step = deflater
            .transform_chunk(&mut out, remaining, FlushMode::Finish)
            .unwrap();
        remaining = &remaining[step.bytes_read..];
        read += step.bytes_read;
        compressed.extend_from_slice(&out[..step.bytes_written]);
    }

    assert_eq!(read, input.len());
    assert_eq!(deflater.total_out(), compressed.len() as u64);
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_protocol_violation_after_done() {
    let compressed = deflate(b"abc", 6).unwrap();
    let mut inflater = Inflater::new();
    let mut out = [0u8; 16];
    let result = inflater
        .transform_chunk(&mut out, &compressed, FlushMode::Finish)
        .unwrap();
    assert!(result.done);

    let err = inflater
        .transform_chunk(&mut out, &[], FlushMode::Finish)
        .unwrap_err();
    assert!(matches!(err, TarflateError::ProtocolViolation { .. }));
}

#[test]
fn test_zero_capacity_output() {
    let mut deflater = Deflater::new(6);
    let mut empty: [u8; 0] = [];
    let result = deflater
        .transform_chunk(&mut empty, b"abc", FlushMode::Finish)
        .unwrap();
    assert_eq!(result.bytes_written, 0);
    assert!(!result.done);
}

#[test]
fn test_sync_output_decodes_before_finish() {
    let mut deflater = Deflater::new(6);
    let mut sink = DynamicBuffer::new();
    let mut input: &[u8] = b"first part, first part";
    transform(&mut deflater, &mut sink, &mut input, FlushMode::Sync).unwrap();
    assert!(!deflater.is_done());

    let mut inflater = Inflater::new();
    let mut out = [0u8; 64];
    let mut synced = sink.data();
    let partial = transform(&mut inflater, &mut out.as_mut_slice(), &mut synced, FlushMode::None)
        .unwrap();
    assert!(!partial.done);
    assert_eq!(&out[..partial.bytes_written], b"first part, first part");

    let mut rest: &[u8] = b" and the rest";
    transform(&mut deflater, &mut sink, &mut rest, FlushMode::Finish).unwrap();
    assert!(deflater.is_done());
    assert_eq!(
        inflate(sink.data()).unwrap(),
        b"first part, first part and the rest"
    );
}

#[test]
fn test_trailing_bytes_untouched() {
    let mut stream = deflate(b"payload", 6).unwrap();
    let end = stream.len();
    stream.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

    let mut inflater = Inflater::new();
    let mut sink = DynamicBuffer::new();
    let mut input = stream.as_slice();
    let result = transform(&mut inflater, &mut sink, &mut input, FlushMode::Finish).unwrap();
    assert!(result.done);
    assert_eq!(result.bytes_read, end);
    assert_eq!(input, &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn test_truncated_stream() {
    let compressed = deflate(&text(5000), 6).unwrap();
    let cut = &compressed[..compressed.len() / 2];
    assert!(matches!(
        inflate(cut),
        Err(TarflateError::Truncated { .. })
    ));
}

#[test]
fn test_corrupted_stream_is_reported() {
    let mut compressed = deflate(&mixed(4000), 6).unwrap();
    // Flip the block type of the first block to the reserved value.
    compressed[0] |= 0b110;
    let err = inflate(&compressed).unwrap_err();
    assert!(matches!(err, TarflateError::CorruptStream { .. }));
}

#[test]
fn test_io_adapters() {
    let input = mixed(70_000);

    let mut writer = TransformWriter::new(Vec::new(), Deflater::new(6));
    for piece in input.chunks(333) {
        writer.write_all(piece).unwrap();
    }
    let compressed = writer.finish().unwrap();

    let mut reader = TransformReader::new(compressed.as_slice(), Inflater::new());
    let mut decoded = Vec::new();
    reader.read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, input);
}
