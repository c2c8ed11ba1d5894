/// Read-only cursor over a byte slice with its own position and mark.
///
/// Handed to [`Codec::decode`](crate::codec::Codec::decode) so a codec can
/// look at accumulated bytes without consuming them. Reporting an incomplete
/// frame and returning leaves the underlying accumulator exactly as it was;
/// the session rewinds the cursor to its mark as a safety net regardless of
/// what the codec did.
#[derive(Debug)]
pub struct DecodeCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    mark: usize,
}

impl<'a> DecodeCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        DecodeCursor {
            bytes,
            pos: 0,
            mark: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn mark(&mut self) {
        self.mark = self.pos;
    }

    pub fn reset(&mut self) {
        self.pos = self.mark;
    }

    /// The unread bytes.
    pub fn as_slice(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    /// Reads a big-endian i32, or `None` if fewer than four bytes remain.
    pub fn get_i32(&mut self) -> Option<i32> {
        let raw = self.take(4)?;
        Some(i32::from_be_bytes(raw.try_into().unwrap()))
    }

    /// Reads a big-endian u16, or `None` if fewer than two bytes remain.
    pub fn get_u16(&mut self) -> Option<u16> {
        let raw = self.take(2)?;
        Some(u16::from_be_bytes(raw.try_into().unwrap()))
    }

    /// Looks at a big-endian i32 without advancing.
    pub fn peek_i32(&self) -> Option<i32> {
        let raw = self.bytes.get(self.pos..self.pos + 4)?;
        Some(i32::from_be_bytes(raw.try_into().unwrap()))
    }

    /// Takes the next `n` bytes, or `None` if fewer remain.
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let raw = self.bytes.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(raw)
    }

    /// Advances by up to `n` bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.bytes.len());
    }

    /// Position of `byte` relative to the current position, if present.
    pub fn find(&self, byte: u8) -> Option<usize> {
        self.as_slice().iter().position(|&b| b == byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_stop_at_the_end() {
        let mut cur = DecodeCursor::new(&[0, 0, 0]);
        assert_eq!(cur.get_i32(), None);
        assert_eq!(cur.position(), 0);
        assert_eq!(cur.get_u16(), Some(0));
        assert_eq!(cur.get_u8(), Some(0));
        assert_eq!(cur.get_u8(), None);
    }

    #[test]
    fn i32_round_trip() {
        let raw = 123456789i32.to_be_bytes();
        let mut cur = DecodeCursor::new(&raw);
        assert_eq!(cur.peek_i32(), Some(123456789));
        assert_eq!(cur.position(), 0);
        assert_eq!(cur.get_i32(), Some(123456789));
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn mark_reset_restores_position() {
        let mut cur = DecodeCursor::new(b"abcdef");
        cur.skip(2);
        cur.mark();
        cur.take(3);
        assert_eq!(cur.position(), 5);
        cur.reset();
        assert_eq!(cur.position(), 2);
        assert_eq!(cur.as_slice(), b"cdef");
    }

    #[test]
    fn find_is_relative_to_position() {
        let mut cur = DecodeCursor::new(b"ab\ncd\n");
        assert_eq!(cur.find(b'\n'), Some(2));
        cur.skip(3);
        assert_eq!(cur.find(b'\n'), Some(2));
    }
}
