//! OSC 1.0 wire codec
//!
//! Decodes messages and (nested) bundles into flat `Message` lists and
//! encodes outbound messages. All multi-byte values are big-endian and every
//! field is padded to a 4-byte boundary.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::{Message, OscArg, RelayError};

const BUNDLE_TAG: &[u8] = b"#bundle\0";

/// Maximum bundle nesting accepted before the packet is rejected
const MAX_BUNDLE_DEPTH: usize = 8;

/// Decode one UDP datagram into zero or more messages
///
/// Bundles are flattened in element order; their time tags are ignored and
/// contents are relayed immediately.
///
/// # Errors
/// `MalformedMessage` describing the first structural problem found.
pub fn decode_packet(data: &[u8]) -> Result<Vec<Message>, RelayError> {
    let mut out = Vec::new();
    decode_into(data, 0, &mut out)?;
    Ok(out)
}

fn decode_into(data: &[u8], depth: usize, out: &mut Vec<Message>) -> Result<(), RelayError> {
    match data.first() {
        Some(b'/') => {
            out.push(decode_message(data)?);
            Ok(())
        }
        Some(b'#') if data.starts_with(BUNDLE_TAG) => decode_bundle(data, depth, out),
        Some(_) => Err(RelayError::malformed(
            "packet is neither a message nor a bundle",
        )),
        None => Err(RelayError::malformed("empty packet")),
    }
}

fn decode_bundle(data: &[u8], depth: usize, out: &mut Vec<Message>) -> Result<(), RelayError> {
    if depth >= MAX_BUNDLE_DEPTH {
        return Err(RelayError::malformed("bundle nesting too deep"));
    }

    let mut buf = &data[BUNDLE_TAG.len()..];
    ensure(&buf, 8, "bundle time tag")?;
    buf.advance(8);

    while buf.has_remaining() {
        ensure(&buf, 4, "bundle element size")?;
        let size = buf.get_i32();
        if size < 0 || size % 4 != 0 {
            return Err(RelayError::malformed(format!(
                "invalid bundle element size {size}"
            )));
        }
        let size = size as usize;
        ensure(&buf, size, "bundle element")?;
        decode_into(&buf[..size], depth + 1, out)?;
        buf.advance(size);
    }
    Ok(())
}

fn decode_message(data: &[u8]) -> Result<Message, RelayError> {
    let mut buf = data;
    let address = read_string(&mut buf, "address")?;

    // OSC 1.0 allows older senders to omit the type tag string entirely
    if !buf.has_remaining() {
        return Ok(Message::bare(address));
    }

    let tags = read_string(&mut buf, "type tags")?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(RelayError::malformed(format!(
            "type tag string '{tags}' does not start with ','"
        )));
    };

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        args.push(read_arg(&mut buf, tag)?);
    }

    if buf.has_remaining() {
        return Err(RelayError::malformed(format!(
            "{} trailing bytes after arguments",
            buf.remaining()
        )));
    }

    Ok(Message::new(address, args))
}

fn read_arg(buf: &mut &[u8], tag: char) -> Result<OscArg, RelayError> {
    let arg = match tag {
        'i' => {
            ensure(buf, 4, "int32")?;
            OscArg::Int(buf.get_i32())
        }
        'f' => {
            ensure(buf, 4, "float32")?;
            OscArg::Float(buf.get_f32())
        }
        'h' => {
            ensure(buf, 8, "int64")?;
            OscArg::Long(buf.get_i64())
        }
        't' => {
            ensure(buf, 8, "time tag")?;
            OscArg::Long(buf.get_u64() as i64)
        }
        'd' => {
            ensure(buf, 8, "float64")?;
            OscArg::Double(buf.get_f64())
        }
        'c' | 'r' => {
            ensure(buf, 4, "char/color")?;
            OscArg::Int(buf.get_i32())
        }
        'm' => {
            ensure(buf, 4, "midi")?;
            let bytes = buf[..4].to_vec();
            buf.advance(4);
            OscArg::Blob(bytes)
        }
        's' | 'S' => OscArg::String(read_string(buf, "string argument")?),
        'b' => OscArg::Blob(read_blob(buf)?),
        'T' => OscArg::Bool(true),
        'F' => OscArg::Bool(false),
        'N' | 'I' => OscArg::Nil,
        other => {
            return Err(RelayError::malformed(format!(
                "unsupported type tag '{other}'"
            )))
        }
    };
    Ok(arg)
}

fn read_string(buf: &mut &[u8], what: &str) -> Result<String, RelayError> {
    let nul = buf
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| RelayError::malformed(format!("{what} is not NUL-terminated")))?;
    let padded = pad4(nul + 1);
    ensure(buf, padded, what)?;

    let text = std::str::from_utf8(&buf[..nul])
        .map_err(|e| RelayError::malformed(format!("{what} is not UTF-8: {e}")))?
        .to_string();
    buf.advance(padded);
    Ok(text)
}

fn read_blob(buf: &mut &[u8]) -> Result<Vec<u8>, RelayError> {
    ensure(buf, 4, "blob size")?;
    let size = buf.get_i32();
    if size < 0 {
        return Err(RelayError::malformed(format!("negative blob size {size}")));
    }
    let size = size as usize;
    let padded = pad4(size);
    ensure(buf, padded, "blob")?;
    let bytes = buf[..size].to_vec();
    buf.advance(padded);
    Ok(bytes)
}

#[inline]
fn ensure(buf: &&[u8], needed: usize, what: &str) -> Result<(), RelayError> {
    if buf.len() < needed {
        return Err(RelayError::malformed(format!(
            "truncated {what}: need {needed} bytes, have {}",
            buf.len()
        )));
    }
    Ok(())
}

#[inline]
fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Encode one message as an OSC packet
pub fn encode_message(message: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    write_string(&mut buf, &message.address);
    write_string(&mut buf, &message.type_tags());

    for arg in &message.args {
        match arg {
            OscArg::Int(v) => buf.put_i32(*v),
            OscArg::Long(v) => buf.put_i64(*v),
            OscArg::Float(v) => buf.put_f32(*v),
            OscArg::Double(v) => buf.put_f64(*v),
            OscArg::String(s) => write_string(&mut buf, s),
            OscArg::Blob(bytes) => {
                buf.put_i32(bytes.len() as i32);
                buf.put_slice(bytes);
                buf.put_bytes(0, pad4(bytes.len()) - bytes.len());
            }
            OscArg::Bool(_) | OscArg::Nil => {}
        }
    }
    buf.freeze()
}

fn write_string(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, pad4(s.len() + 1) - s.len());
}
