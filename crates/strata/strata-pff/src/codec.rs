//! Record framing.
//!
//! ```text
//! TEXT : [0x01][bytes ...][0x00]
//! IMAGE: [0x02][nbytes raw bytes]
//! ```
//!
//! An IMAGE record does not carry its length; the reader must know it from
//! context, usually from the TEXT header record in front of it. TEXT bodies
//! must not contain a zero byte. Writers do not check this.

use crate::error::PffError;
use std::io::{self, BufRead, Read, Write};

pub const PFF_TYPE_TEXT: u8 = 0x1;
pub const PFF_TYPE_IMAGE: u8 = 0x2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Text,
    Image,
}

impl RecordKind {
    pub fn tag(self) -> u8 {
        match self {
            RecordKind::Text => PFF_TYPE_TEXT,
            RecordKind::Image => PFF_TYPE_IMAGE,
        }
    }
}

/// Writes one TEXT record and returns the number of bytes framed.
pub fn write_text<W: Write + ?Sized>(w: &mut W, text: &[u8]) -> io::Result<usize> {
    w.write_all(&[PFF_TYPE_TEXT])?;
    w.write_all(text)?;
    w.write_all(&[0])?;
    Ok(text.len() + 2)
}

/// Writes one IMAGE record and returns the number of bytes framed.
pub fn write_image<W: Write + ?Sized>(w: &mut W, image: &[u8]) -> io::Result<usize> {
    w.write_all(&[PFF_TYPE_IMAGE])?;
    w.write_all(image)?;
    Ok(image.len() + 1)
}

/// Consumes exactly one tag byte and checks it.
fn expect_tag<R: Read + ?Sized>(r: &mut R, kind: RecordKind) -> Result<(), PffError> {
    let mut tag = [0u8; 1];
    read_exact(r, &mut tag, kind)?;
    if tag[0] != kind.tag() {
        return Err(PffError::BadType {
            expected: kind,
            found: tag[0],
        });
    }
    Ok(())
}

fn read_exact<R: Read + ?Sized>(r: &mut R, buf: &mut [u8], kind: RecordKind) -> Result<(), PffError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => PffError::Read { kind },
        _ => PffError::Io(e),
    })
}

/// Reads one TEXT record and returns its body without the terminator.
pub fn read_text<R: BufRead + ?Sized>(r: &mut R) -> Result<Vec<u8>, PffError> {
    expect_tag(r, RecordKind::Text)?;
    let mut body = Vec::new();
    r.read_until(0, &mut body)?;
    if body.pop() != Some(0) {
        return Err(PffError::Read {
            kind: RecordKind::Text,
        });
    }
    Ok(body)
}

/// Reads one IMAGE record of `buf.len()` bytes into `buf`.
pub fn read_image_into<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<(), PffError> {
    expect_tag(r, RecordKind::Image)?;
    read_exact(r, buf, RecordKind::Image)
}

/// Reads one IMAGE record of `nbytes` bytes.
pub fn read_image<R: Read + ?Sized>(r: &mut R, nbytes: usize) -> Result<Vec<u8>, PffError> {
    let mut buf = vec![0u8; nbytes];
    read_image_into(r, &mut buf)?;
    Ok(buf)
}
