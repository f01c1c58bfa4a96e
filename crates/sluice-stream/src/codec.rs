//! Binary encode/decode for the step-stream format.
//!
//! All integers are little-endian. Strings are length-prefixed with a
//! `u32`. Element data is written densely with no alignment padding.

use std::io::{self, Read, Write};

use sluice_core::{Buffer, Dtype, Shape};

use crate::error::StreamError;
use crate::hash::checksum;
use crate::types::{Block, Frame, StepFrame, StreamHeader, VarBlocks, VarDecl};
use crate::{FORMAT_VERSION, FRAME_PREAMBLE_LEN, MAGIC, TAG_END, TAG_STEP};

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), StreamError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), StreamError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> Result<(), StreamError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> Result<(), StreamError> {
    write_u32_le(w, s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Write a shape as `ndim u8` followed by `ndim` u64 extents.
pub fn write_shape(w: &mut dyn Write, shape: &[usize]) -> Result<(), StreamError> {
    let ndim = u8::try_from(shape.len()).map_err(|_| StreamError::Malformed {
        detail: format!("shape has {} dimensions, at most 255 allowed", shape.len()),
    })?;
    write_u8(w, ndim)?;
    for &d in shape {
        write_u64_le(w, d as u64)?;
    }
    Ok(())
}

/// Write every element of `buf` in little-endian order.
pub fn write_buffer(w: &mut dyn Write, buf: &Buffer) -> Result<(), StreamError> {
    macro_rules! dense {
        ($v:expr) => {
            for x in $v {
                w.write_all(&x.to_le_bytes())?;
            }
        };
    }
    match buf {
        Buffer::F64(v) => dense!(v),
        Buffer::F32(v) => dense!(v),
        Buffer::I64(v) => dense!(v),
        Buffer::I32(v) => dense!(v),
        Buffer::U64(v) => dense!(v),
    }
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, StreamError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, StreamError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut dyn Read) -> Result<u64, StreamError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str(r: &mut dyn Read) -> Result<String, StreamError> {
    let len = read_u32_le(r)? as usize;
    let mut buf = Vec::new();
    (&mut *r).take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    String::from_utf8(buf).map_err(|e| StreamError::Malformed {
        detail: format!("invalid UTF-8 string: {e}"),
    })
}

/// Read a dtype tag.
pub fn read_dtype(r: &mut dyn Read) -> Result<Dtype, StreamError> {
    let tag = read_u8(r)?;
    Dtype::from_tag(tag).ok_or(StreamError::UnknownDtype { tag })
}

/// Read a shape written by [`write_shape`].
pub fn read_shape(r: &mut dyn Read) -> Result<Shape, StreamError> {
    let ndim = read_u8(r)? as usize;
    let mut shape = Shape::with_capacity(ndim);
    for _ in 0..ndim {
        let d = read_u64_le(r)?;
        let d = usize::try_from(d).map_err(|_| StreamError::Malformed {
            detail: format!("extent {d} does not fit in memory"),
        })?;
        shape.push(d);
    }
    Ok(shape)
}

/// Read `count` elements of `dtype` from an in-memory payload cursor.
///
/// The byte length is checked against what remains before allocating,
/// so a corrupt extent cannot trigger a huge allocation.
fn read_buffer(cur: &mut &[u8], dtype: Dtype, count: usize) -> Result<Buffer, StreamError> {
    let need = count
        .checked_mul(dtype.size())
        .filter(|&n| n <= cur.len())
        .ok_or_else(|| StreamError::Malformed {
            detail: format!(
                "block of {count} {dtype} elements exceeds remaining {} payload bytes",
                cur.len()
            ),
        })?;
    let (bytes, rest) = cur.split_at(need);
    *cur = rest;

    macro_rules! dense {
        ($ty:ty, $variant:ident, $n:expr) => {
            Buffer::$variant(
                bytes
                    .chunks_exact($n)
                    .map(|c| {
                        let mut a = [0u8; $n];
                        a.copy_from_slice(c);
                        <$ty>::from_le_bytes(a)
                    })
                    .collect(),
            )
        };
    }
    Ok(match dtype {
        Dtype::F64 => dense!(f64, F64, 8),
        Dtype::F32 => dense!(f32, F32, 4),
        Dtype::I64 => dense!(i64, I64, 8),
        Dtype::I32 => dense!(i32, I32, 4),
        Dtype::U64 => dense!(u64, U64, 8),
    })
}

// ── Header encode/decode ────────────────────────────────────────

/// Encode the stream header (magic, version, name, declarations).
pub fn encode_header(w: &mut dyn Write, header: &StreamHeader) -> Result<(), StreamError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)?;
    write_length_prefixed_str(w, &header.name)?;
    write_u32_le(w, header.decls.len() as u32)?;
    for decl in &header.decls {
        write_length_prefixed_str(w, &decl.name)?;
        write_u8(w, decl.dtype.tag())?;
        write_shape(w, &decl.shape)?;
    }
    Ok(())
}

/// Decode and validate the stream header.
pub fn decode_header(r: &mut dyn Read) -> Result<StreamHeader, StreamError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(StreamError::InvalidMagic);
    }

    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(StreamError::UnsupportedVersion { found: version });
    }

    let name = read_length_prefixed_str(r)?;
    let decl_count = read_u32_le(r)? as usize;
    let mut decls = Vec::with_capacity(decl_count.min(1024));
    for _ in 0..decl_count {
        decls.push(VarDecl {
            name: read_length_prefixed_str(r)?,
            dtype: read_dtype(r)?,
            shape: read_shape(r)?,
        });
    }
    Ok(StreamHeader { name, decls })
}

/// Decode a header from the start of `bytes`, which may not hold the
/// whole header yet.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the header
/// and the number of bytes it occupied.
pub fn try_decode_header(bytes: &[u8]) -> Result<Option<(StreamHeader, usize)>, StreamError> {
    let mut cur = bytes;
    match decode_header(&mut cur) {
        Ok(header) => Ok(Some((header, bytes.len() - cur.len()))),
        Err(StreamError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

// ── Frame encode/decode ─────────────────────────────────────────

/// Serialize a step frame's payload.
pub fn encode_step_payload(frame: &StepFrame) -> Result<Vec<u8>, StreamError> {
    frame.check_shapes()?;
    let mut buf = Vec::new();
    write_u64_le(&mut buf, frame.step)?;
    write_u32_le(&mut buf, frame.vars.len() as u32)?;
    for var in &frame.vars {
        write_length_prefixed_str(&mut buf, &var.name)?;
        write_u8(&mut buf, var.dtype.tag())?;
        write_u32_le(&mut buf, var.blocks.len() as u32)?;
        for block in &var.blocks {
            write_shape(&mut buf, &block.shape)?;
            write_buffer(&mut buf, &block.data)?;
        }
    }
    Ok(buf)
}

/// Assemble a complete frame (preamble + payload) in memory.
///
/// Writing the result with a single `write_all` keeps a frame from being
/// interleaved with anything else written to the same sink.
pub fn encode_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_PREAMBLE_LEN + payload.len());
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&checksum(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Decode a step payload.
pub fn decode_step_payload(payload: &[u8]) -> Result<StepFrame, StreamError> {
    let mut cur = payload;
    let step = read_u64_le(&mut cur)?;
    let var_count = read_u32_le(&mut cur)? as usize;
    let mut vars = Vec::with_capacity(var_count.min(1024));
    for _ in 0..var_count {
        let name = read_length_prefixed_str(&mut cur)?;
        let dtype = read_dtype(&mut cur)?;
        let block_count = read_u32_le(&mut cur)? as usize;
        let mut blocks = Vec::with_capacity(block_count.min(1024));
        for _ in 0..block_count {
            let shape = read_shape(&mut cur)?;
            let count = shape
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .ok_or_else(|| StreamError::Malformed {
                    detail: format!("block extents {:?} overflow", shape.as_slice()),
                })?;
            let data = read_buffer(&mut cur, dtype, count)?;
            blocks.push(Block { shape, data });
        }
        vars.push(VarBlocks {
            name,
            dtype,
            blocks,
        });
    }
    if !cur.is_empty() {
        return Err(StreamError::Malformed {
            detail: format!("{} trailing bytes after step {step}", cur.len()),
        });
    }
    Ok(StepFrame { step, vars })
}

fn decode_body(tag: u8, recorded: u64, payload: &[u8]) -> Result<Frame, StreamError> {
    let computed = checksum(payload);
    if computed != recorded {
        return Err(StreamError::ChecksumMismatch { recorded, computed });
    }
    match tag {
        TAG_STEP => decode_step_payload(payload).map(Frame::Step),
        TAG_END if payload.is_empty() => Ok(Frame::End),
        TAG_END => Err(StreamError::Malformed {
            detail: format!("end marker carries {} payload bytes", payload.len()),
        }),
        tag => Err(StreamError::UnknownFrameTag { tag }),
    }
}

/// Decode one frame from a reader.
///
/// Returns `Ok(None)` on clean EOF at a frame boundary and an error if
/// the stream ends partway through a frame.
pub fn decode_frame(r: &mut dyn Read) -> Result<Option<Frame>, StreamError> {
    let mut tag = [0u8; 1];
    loop {
        match r.read(&mut tag) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StreamError::Io(e)),
        }
    }
    let len = read_u64_le(r)?;
    let recorded = read_u64_le(r)?;
    let mut payload = Vec::new();
    (&mut *r).take(len).read_to_end(&mut payload)?;
    if payload.len() as u64 != len {
        return Err(StreamError::Malformed {
            detail: format!("truncated frame: got {} of {len} payload bytes", payload.len()),
        });
    }
    decode_body(tag[0], recorded, &payload).map(Some)
}

/// Decode one frame from the start of `bytes`, which may end partway
/// through the frame.
///
/// Returns `Ok(None)` when the frame is not fully present yet, otherwise
/// the frame and the number of bytes it occupied.
pub fn try_decode_frame(bytes: &[u8]) -> Result<Option<(Frame, usize)>, StreamError> {
    if bytes.len() < FRAME_PREAMBLE_LEN {
        return Ok(None);
    }
    let mut cur = &bytes[1..];
    let len = read_u64_le(&mut cur)?;
    let recorded = read_u64_le(&mut cur)?;
    let available = (bytes.len() - FRAME_PREAMBLE_LEN) as u64;
    if len > available {
        return Ok(None);
    }
    let end = FRAME_PREAMBLE_LEN + len as usize;
    let frame = decode_body(bytes[0], recorded, &bytes[FRAME_PREAMBLE_LEN..end])?;
    Ok(Some((frame, end)))
}
