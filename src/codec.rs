//! Canonical binary encoding
//!
//! Deterministic layout used for everything that is hashed or signed:
//! - fixed-width big-endian integers
//! - LEB128 varints for lengths and counts
//! - fixed-size byte fields for hashes, keys and signatures
//!
//! Decoding is strict: trailing bytes are an error.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("varint overflow")]
    VarIntOverflow,
    #[error("length {0} exceeds remaining input")]
    LengthOverflow(u64),
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
    #[error("unknown {kind} tag {tag}")]
    UnknownTag { kind: &'static str, tag: u8 },
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Types with a canonical byte representation
pub trait Encode {
    fn encode(&self, enc: &mut Encoder);

    fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.finish()
    }
}

pub trait Decode: Sized {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self>;

    /// Decode the whole slice
    fn from_bytes(bytes: &[u8]) -> DecodeResult<Self> {
        let mut dec = Decoder::new(bytes);
        let value = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(value)
    }
}

#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn varint(&mut self, mut v: u64) -> &mut Self {
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
        self
    }

    /// Raw bytes without a length prefix
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Varint length followed by the bytes
    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.varint(bytes.len() as u64);
        self.raw(bytes)
    }

    pub fn item<T: Encode + ?Sized>(&mut self, item: &T) -> &mut Self {
        item.encode(self);
        self
    }

    /// Varint count followed by each item
    pub fn list<T: Encode>(&mut self, items: &[T]) -> &mut Self {
        self.varint(items.len() as u64);
        for item in items {
            item.encode(self);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> DecodeResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> DecodeResult<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn varint(&mut self) -> DecodeResult<u64> {
        let mut result = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.u8()?;
            let low = (byte & 0x7F) as u64;
            if shift == 63 && low > 1 {
                return Err(DecodeError::VarIntOverflow);
            }
            result |= low << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(DecodeError::VarIntOverflow)
    }

    /// Varint that must fit a length or count
    pub fn length(&mut self) -> DecodeResult<usize> {
        let n = self.varint()?;
        if n > self.remaining() as u64 {
            return Err(DecodeError::LengthOverflow(n));
        }
        Ok(n as usize)
    }

    pub fn array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn bytes(&mut self) -> DecodeResult<Vec<u8>> {
        let n = self.length()?;
        Ok(self.take(n)?.to_vec())
    }

    pub fn item<T: Decode>(&mut self) -> DecodeResult<T> {
        T::decode(self)
    }

    pub fn list<T: Decode>(&mut self) -> DecodeResult<Vec<T>> {
        // every encoded item takes at least one byte
        let n = self.length()?;
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(T::decode(self)?);
        }
        Ok(items)
    }

    pub fn finish(self) -> DecodeResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

impl Encode for Vec<u8> {
    fn encode(&self, enc: &mut Encoder) {
        enc.bytes(self);
    }
}

impl Decode for Vec<u8> {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        dec.bytes()
    }
}

impl Encode for i64 {
    fn encode(&self, enc: &mut Encoder) {
        enc.varint(*self as u64);
    }
}

impl Decode for i64 {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(dec.varint()? as i64)
    }
}
