//! XDR (External Data Representation) encoding/decoding
//!
//! RFC 4506 primitives used by the COMPOUND codec and the listing size
//! accounting.

use bytes::{BufMut, Bytes, BytesMut};
use std::io;

/// Number of padding bytes that follow `len` opaque bytes
pub const fn xdr_pad(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// Encoded size of a variable-length opaque holding `len` bytes
pub const fn xdr_opaque_size(len: usize) -> usize {
    4 + len + xdr_pad(len)
}

fn short(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, format!("not enough data for {what}"))
}

/// XDR encoder
pub struct XdrEncoder {
    buf: BytesMut,
}

impl XdrEncoder {
    /// Create a new encoder with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new encoder with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Encode a 32-bit integer
    pub fn encode_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Encode a 64-bit integer
    pub fn encode_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Encode a 64-bit signed integer
    pub fn encode_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    /// Encode a boolean
    pub fn encode_bool(&mut self, value: bool) {
        self.encode_u32(u32::from(value));
    }

    /// Encode a variable-length opaque (bytes)
    pub fn encode_opaque(&mut self, data: &[u8]) {
        self.encode_u32(data.len() as u32);
        self.encode_opaque_fixed(data);
    }

    /// Encode a fixed-length opaque
    pub fn encode_opaque_fixed(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
        self.buf.put_bytes(0, xdr_pad(data.len()));
    }

    /// Encode a string
    pub fn encode_string(&mut self, s: &str) {
        self.encode_opaque(s.as_bytes());
    }

    /// Encode a bitmap4 (length-prefixed word array)
    pub fn encode_bitmap(&mut self, words: &[u32]) {
        self.encode_u32(words.len() as u32);
        for word in words {
            self.encode_u32(*word);
        }
    }

    /// Encode an optional value as an XDR discriminated union
    pub fn encode_option<T>(&mut self, value: Option<&T>, f: impl FnOnce(&mut Self, &T)) {
        match value {
            Some(v) => {
                self.encode_bool(true);
                f(self, v);
            }
            None => self.encode_bool(false),
        }
    }

    /// Get the encoded bytes
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Get current length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for XdrEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// XDR decoder
pub struct XdrDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> XdrDecoder<'a> {
    /// Upper bound on decoded array lengths
    pub const MAX_ARRAY: usize = 1 << 16;

    /// Create a new decoder
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> io::Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(short(what));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Decode a 32-bit integer
    pub fn decode_u32(&mut self) -> io::Result<u32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4, "u32")?);
        Ok(u32::from_be_bytes(word))
    }

    /// Decode a 64-bit integer
    pub fn decode_u64(&mut self) -> io::Result<u64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8, "u64")?);
        Ok(u64::from_be_bytes(word))
    }

    /// Decode a 64-bit signed integer
    pub fn decode_i64(&mut self) -> io::Result<i64> {
        self.decode_u64().map(|v| v as i64)
    }

    /// Decode a boolean
    pub fn decode_bool(&mut self) -> io::Result<bool> {
        self.decode_u32().map(|v| v != 0)
    }

    /// Decode an array length, bounded by [`Self::MAX_ARRAY`]
    pub fn decode_len(&mut self) -> io::Result<usize> {
        let len = self.decode_u32()? as usize;
        if len > Self::MAX_ARRAY {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("array length {len} too large"),
            ));
        }
        Ok(len)
    }

    /// Decode a variable-length opaque
    pub fn decode_opaque(&mut self) -> io::Result<Vec<u8>> {
        let len = self.decode_u32()? as usize;
        self.decode_opaque_fixed(len)
    }

    /// Decode a fixed-length opaque
    pub fn decode_opaque_fixed(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let padded = len
            .checked_add(xdr_pad(len))
            .ok_or_else(|| short("opaque"))?;
        let data = self.take(padded, "opaque")?;
        Ok(data[..len].to_vec())
    }

    /// Decode a fixed-size array such as a verifier or stateid body
    pub fn decode_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut out = [0u8; N];
        let padded = N + xdr_pad(N);
        out.copy_from_slice(&self.take(padded, "fixed array")?[..N]);
        Ok(out)
    }

    /// Decode a string
    pub fn decode_string(&mut self) -> io::Result<String> {
        let bytes = self.decode_opaque()?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Decode a bitmap4
    pub fn decode_bitmap(&mut self) -> io::Result<Vec<u32>> {
        let len = self.decode_len()?;
        (0..len).map(|_| self.decode_u32()).collect()
    }

    /// Skip bytes
    pub fn skip(&mut self, n: usize) -> io::Result<()> {
        self.take(n, "skip").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        assert_eq!(xdr_pad(0), 0);
        assert_eq!(xdr_pad(1), 3);
        assert_eq!(xdr_pad(4), 0);
        assert_eq!(xdr_opaque_size(5), 12);
    }

    #[test]
    fn test_opaque_is_padded() {
        let mut enc = XdrEncoder::new();
        enc.encode_opaque(&[1, 2, 3, 4, 5]);
        enc.encode_u32(7);
        let data = enc.finish();
        assert_eq!(data.len(), 4 + 8 + 4);

        let mut dec = XdrDecoder::new(&data);
        assert_eq!(dec.decode_opaque().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(dec.decode_u32().unwrap(), 7);
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn test_short_input() {
        let mut dec = XdrDecoder::new(&[0, 0, 0, 9, 1, 2]);
        let err = dec.decode_opaque().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_array_rejected() {
        let mut enc = XdrEncoder::new();
        enc.encode_u32(u32::MAX);
        let data = enc.finish();
        let mut dec = XdrDecoder::new(&data);
        assert_eq!(
            dec.decode_bitmap().unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn test_fixed_array() {
        let mut enc = XdrEncoder::new();
        enc.encode_opaque_fixed(&[9u8; 12]);
        let data = enc.finish();
        let mut dec = XdrDecoder::new(&data);
        assert_eq!(dec.decode_array::<12>().unwrap(), [9u8; 12]);
    }
}
