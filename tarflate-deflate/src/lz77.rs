//! LZ77 match finding for DEFLATE.
//!
//! The encoder keeps a 64 KiB buffer: up to 32 KiB of history followed by
//! the data being tokenized. When the buffer fills, the older half is
//! discarded and every stored position shifts down by 32 KiB.
//!
//! Matches are found through hash chains keyed on 3-byte prefixes. The
//! chain depth and lazy matching depend on the compression level.

/// Maximum back-reference distance (32 KiB).
pub const WINDOW_SIZE: usize = 32768;

/// Minimum match length.
pub const MIN_MATCH: usize = 3;

/// Maximum match length.
pub const MAX_MATCH: usize = 258;

const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Size of the hash table (power of 2).
const HASH_SIZE: usize = 32768;

const HASH_MASK: usize = HASH_SIZE - 1;

/// A token produced by LZ77 compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Token {
    /// A literal byte.
    Literal(u8),
    /// A back-reference to previously seen data.
    Match {
        /// Number of bytes to copy (3-258).
        length: u16,
        /// Distance back into the window (1-32768).
        distance: u16,
    },
}

/// Per-level search parameters.
#[derive(Debug, Clone, Copy)]
struct SearchParams {
    /// Chain entries examined per search.
    max_chain: usize,
    /// Shortest match worth emitting.
    min_match: usize,
    /// Matches shorter than this trigger a lazy look one byte ahead;
    /// 0 disables lazy matching.
    lazy_below: usize,
}

impl SearchParams {
    fn for_level(level: u8) -> Self {
        let (max_chain, min_match, lazy_below) = match level.min(9) {
            0 | 1 => (4, 4, 0),
            2 => (8, 4, 0),
            3 => (16, 4, 0),
            4 => (32, 4, 0),
            5 => (64, 4, 16),
            6 => (128, 4, 32),
            7 => (256, 3, 64),
            8 => (1024, 3, 128),
            _ => (4096, 3, MAX_MATCH),
        };
        Self {
            max_chain,
            min_match,
            lazy_below,
        }
    }
}

/// Streaming LZ77 encoder.
///
/// Each call to [`compress`](Self::compress) tokenizes new input. Matches
/// may reach back into data from earlier calls, up to 32 KiB.
#[derive(Debug, Clone)]
pub struct Lz77Encoder {
    /// History plus pending data.
    window: Vec<u8>,
    /// Valid bytes in `window`.
    window_len: usize,
    /// Most recent position (+1) for each hash, 0 when empty.
    head: Vec<u32>,
    /// Previous position (+1) with the same hash, by position modulo 32 KiB.
    prev: Vec<u32>,
    /// Every position below this has been inserted into the chains.
    hashed: usize,
    params: SearchParams,
}

impl Lz77Encoder {
    /// Create a new LZ77 encoder with default settings.
    pub fn new() -> Self {
        Self::with_level(6)
    }

    /// Create a new LZ77 encoder with the specified compression level (1-9).
    pub fn with_level(level: u8) -> Self {
        Self {
            window: vec![0; 2 * WINDOW_SIZE],
            window_len: 0,
            head: vec![0; HASH_SIZE],
            prev: vec![0; WINDOW_SIZE],
            hashed: 0,
            params: SearchParams::for_level(level),
        }
    }

    /// Reset the encoder state, forgetting all history.
    pub fn reset(&mut self) {
        self.window_len = 0;
        self.hashed = 0;
        self.head.fill(0);
        self.prev.fill(0);
    }

    /// Tokenize `input`, appending to `tokens`.
    pub fn compress(&mut self, mut input: &[u8], tokens: &mut Vec<Lz77Token>) {
        while !input.is_empty() {
            if self.window_len == self.window.len() {
                self.slide_window();
            }
            let take = input.len().min(self.window.len() - self.window_len);
            let start = self.window_len;
            self.window[start..start + take].copy_from_slice(&input[..take]);
            self.window_len += take;
            input = &input[take..];

            self.tokenize(start, tokens);
        }
    }

    /// Compress all data at once (convenience method).
    pub fn compress_all(input: &[u8], level: u8) -> Vec<Lz77Token> {
        let mut tokens = Vec::with_capacity(input.len() / 2);
        Self::with_level(level).compress(input, &mut tokens);
        tokens
    }

    /// Tokenize `window[start..window_len]`.
    fn tokenize(&mut self, start: usize, tokens: &mut Vec<Lz77Token>) {
        let end = self.window_len;
        let mut pos = start;
        // Match already found for `pos` by a lazy look-ahead.
        let mut carried: Option<(usize, usize)> = None;

        while pos < end {
            let current = match carried.take() {
                Some(found) => Some(found),
                None => self.find_match(pos, end - pos),
            };

            let Some((length, distance)) = current else {
                tokens.push(Lz77Token::Literal(self.window[pos]));
                pos += 1;
                continue;
            };

            if length < self.params.lazy_below && pos + 1 < end {
                let next = self.find_match(pos + 1, end - pos - 1);
                if next.is_some_and(|(next_len, _)| next_len > length) {
                    tokens.push(Lz77Token::Literal(self.window[pos]));
                    pos += 1;
                    carried = next;
                    continue;
                }
            }

            tokens.push(Lz77Token::Match {
                length: length as u16,
                distance: distance as u16,
            });
            pos += length;
        }
    }

    /// Compute hash for the 3 bytes at `pos`.
    #[inline(always)]
    fn hash(&self, pos: usize) -> usize {
        let b0 = self.window[pos] as usize;
        let b1 = self.window[pos + 1] as usize;
        let b2 = self.window[pos + 2] as usize;
        let h = b0.wrapping_mul(506832829)
            ^ (b1.wrapping_mul(2654435761) << 8)
            ^ (b2.wrapping_mul(374761393) << 16);
        (h ^ (h >> 15)) & HASH_MASK
    }

    /// Insert every position below `limit` that has 3 bytes available.
    fn insert_up_to(&mut self, limit: usize) {
        let stop = limit.min(self.window_len.saturating_sub(MIN_MATCH - 1));
        while self.hashed < stop {
            let pos = self.hashed;
            let h = self.hash(pos);
            self.prev[pos & WINDOW_MASK] = self.head[h];
            self.head[h] = pos as u32 + 1;
            self.hashed += 1;
        }
    }

    /// Longest match for `pos` within the next `max_len` bytes, as
    /// `(length, distance)`.
    fn find_match(&mut self, pos: usize, max_len: usize) -> Option<(usize, usize)> {
        self.insert_up_to(pos);

        let max_len = max_len.min(MAX_MATCH);
        if max_len < self.params.min_match || pos + MIN_MATCH > self.window_len {
            return None;
        }

        let mut candidate = self.head[self.hash(pos)];
        let mut best_len = self.params.min_match - 1;
        let mut best_dist = 0;
        let mut chain = self.params.max_chain;

        while candidate != 0 && chain > 0 {
            let cand = candidate as usize - 1;
            let dist = pos - cand;
            if dist > WINDOW_SIZE {
                break;
            }

            // Reject quickly on the byte that would extend the best match.
            if self.window[cand + best_len] == self.window[pos + best_len] {
                let len = self.window[cand..cand + max_len]
                    .iter()
                    .zip(&self.window[pos..pos + max_len])
                    .take_while(|(a, b)| a == b)
                    .count();
                if len > best_len {
                    best_len = len;
                    best_dist = dist;
                    if len >= max_len {
                        break;
                    }
                }
            }

            candidate = self.prev[cand & WINDOW_MASK];
            chain -= 1;
        }

        (best_dist != 0).then_some((best_len, best_dist))
    }

    /// Drop the older 32 KiB of the buffer.
    fn slide_window(&mut self) {
        self.window.copy_within(WINDOW_SIZE..self.window_len, 0);
        self.window_len -= WINDOW_SIZE;
        self.hashed = self.hashed.saturating_sub(WINDOW_SIZE);

        let shift = WINDOW_SIZE as u32;
        for entry in self.head.iter_mut().chain(self.prev.iter_mut()) {
            *entry = entry.saturating_sub(shift);
        }
    }
}

impl Default for Lz77Encoder {
    fn default() -> Self {
        Self::new()
    }
}
