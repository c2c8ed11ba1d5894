//! Byte Accumulation
//!
//! Growable byte buffer used by sessions to accumulate partially received
//! frames, plus a non-consuming cursor for speculative decoding.
//!
//! A session appends every chunk the socket yields into a [`ByteBuf`], then
//! lets the codec attempt decodes through a [`DecodeCursor`]. The cursor
//! never mutates the accumulator, so an incomplete decode simply rewinds to
//! its mark and the bytes stay put for the next readiness event.

pub use cursor::DecodeCursor;

mod cursor;

const MIN_CAPACITY: usize = 64;

/// Growable byte accumulator with an explicit read position and mark.
///
/// Writes always append at the end and grow the backing storage geometrically
/// (capacity doubles until the write fits), preserving already written
/// content. Reads advance the read position and report exhaustion through
/// `Option`/`0` instead of panicking.
#[derive(Debug, Default)]
pub struct ByteBuf {
    data: Vec<u8>,
    read_pos: usize,
    mark: Option<usize>,
}

impl ByteBuf {
    pub fn new() -> Self {
        ByteBuf::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuf {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
            mark: None,
        }
    }

    /// Appends `src`, growing the backing storage geometrically when needed.
    pub fn append(&mut self, src: &[u8]) {
        let needed = self.data.len() + src.len();
        if needed > self.data.capacity() {
            let mut new_cap = self.data.capacity().max(MIN_CAPACITY);
            while new_cap < needed {
                new_cap *= 2;
            }
            self.data.reserve_exact(new_cap - self.data.len());
        }
        self.data.extend_from_slice(src);
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Total bytes held, read or not.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.read_pos
    }

    /// Remembers the current read position for a later [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.mark = Some(self.read_pos);
    }

    /// Rewinds the read position to the last mark. Without a mark this
    /// rewinds to the start.
    pub fn reset(&mut self) {
        self.read_pos = self.mark.unwrap_or(0);
    }

    /// Reads one byte, or `None` once exhausted.
    pub fn get_u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.read_pos)?;
        self.read_pos += 1;
        Some(b)
    }

    /// Copies up to `dst.len()` unread bytes into `dst`, returning how many
    /// were actually copied.
    pub fn get(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.data[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        n
    }

    /// Advances the read position by up to `n` bytes.
    pub fn skip(&mut self, n: usize) {
        self.read_pos = (self.read_pos + n).min(self.data.len());
    }

    /// Drops everything already read, moving unread bytes to the front.
    /// Invalidates the mark.
    pub fn compact(&mut self) {
        if self.read_pos > 0 {
            self.data.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.mark = None;
    }

    /// Consumes `n` unread bytes and compacts in one step. This is the read
    /// path's "keep only what the codec left behind" operation.
    pub fn consume(&mut self, n: usize) {
        self.skip(n);
        self.compact();
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.mark = None;
    }

    /// The unread bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    /// An independent read cursor over the unread bytes, without copying.
    /// The accumulator itself is left untouched no matter what the cursor
    /// does, which is what makes speculative decoding safe.
    pub fn cursor(&self) -> DecodeCursor<'_> {
        DecodeCursor::new(self.as_slice())
    }
}
