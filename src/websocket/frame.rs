/*
 * frame.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of callback-ws, a WebSocket callback client.
 *
 * callback-ws is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * callback-ws is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with callback-ws.  If not, see <http://www.gnu.org/licenses/>.
 */

//! WebSocket frame codec (RFC 6455 §5): incremental parser for server frames,
//! masked encoder for client frames.
//!
//! Fragments are surfaced as-is; nothing is reassembled here.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::io;

pub const OP_CONTINUATION: u8 = 0x0;
pub const OP_TEXT: u8 = 0x1;
pub const OP_BINARY: u8 = 0x2;
pub const OP_CLOSE: u8 = 0x8;
pub const OP_PING: u8 = 0x9;
pub const OP_PONG: u8 = 0xA;

/// Largest payload accepted in one frame.
pub const MAX_PAYLOAD_LEN: u64 = i32::MAX as u64;

/// Largest payload a control frame may carry.
const MAX_CONTROL_PAYLOAD: usize = 125;

/// One decoded WebSocket frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Complete (FIN) text frame, already validated as UTF-8.
    Text(String),
    /// Complete (FIN) binary frame.
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close { code: Option<u16>, reason: String },
    /// A continuation frame or the non-final start of a fragmented message.
    Fragment { opcode: u8, fin: bool, payload: Bytes },
}

impl Frame {
    pub fn opcode(&self) -> u8 {
        match self {
            Frame::Text(_) => OP_TEXT,
            Frame::Binary(_) => OP_BINARY,
            Frame::Ping(_) => OP_PING,
            Frame::Pong(_) => OP_PONG,
            Frame::Close { .. } => OP_CLOSE,
            Frame::Fragment { opcode, .. } => *opcode,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close { .. } => "close",
            Frame::Fragment { .. } => "fragment",
        }
    }

    /// False only for a fragment that more frames will follow.
    pub fn is_final(&self) -> bool {
        match self {
            Frame::Fragment { fin, .. } => *fin,
            _ => true,
        }
    }

    /// Wire payload. For a close frame the reason is cut on a char boundary
    /// so the whole payload fits in a control frame.
    pub fn payload(&self) -> Cow<'_, [u8]> {
        match self {
            Frame::Text(text) => Cow::Borrowed(text.as_bytes()),
            Frame::Binary(data) | Frame::Ping(data) | Frame::Pong(data) => Cow::Borrowed(&data[..]),
            Frame::Fragment { payload, .. } => Cow::Borrowed(&payload[..]),
            Frame::Close { code: None, .. } => Cow::Borrowed(&[]),
            Frame::Close { code: Some(code), reason } => {
                let mut end = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
                while !reason.is_char_boundary(end) {
                    end -= 1;
                }
                let mut payload = Vec::with_capacity(2 + end);
                payload.extend_from_slice(&code.to_be_bytes());
                payload.extend_from_slice(&reason.as_bytes()[..end]);
                Cow::Owned(payload)
            }
        }
    }

    /// Encode as a masked client frame, appending to `out`.
    pub fn encode_masked(&self, mask_key: [u8; 4], out: &mut BytesMut) {
        encode_frame(self.opcode(), self.is_final(), &self.payload(), mask_key, out)
    }
}

/// Append one masked frame to `out`.
pub fn encode_frame(opcode: u8, fin: bool, payload: &[u8], mask_key: [u8; 4], out: &mut BytesMut) {
    let len = payload.len();
    out.reserve(14 + len);
    out.put_u8(if fin { 0x80 } else { 0 } | (opcode & 0x0F));
    if len < 126 {
        out.put_u8(0x80 | len as u8);
    } else if len <= u16::MAX as usize {
        out.put_u8(0x80 | 126);
        out.put_u16(len as u16);
    } else {
        out.put_u8(0x80 | 127);
        out.put_u64(len as u64);
    }
    out.put_slice(&mask_key);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask_key[i % 4]));
}

fn protocol_error(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Incremental parser for frames sent by a server (unmasked).
#[derive(Debug, Default)]
pub struct FrameParser {
    frames_parsed: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_parsed(&self) -> u64 {
        self.frames_parsed
    }

    /// Take the next complete frame off the front of `buf`.
    /// Returns `Ok(None)` when more data is needed; `buf` is left untouched in that case.
    pub fn next_frame(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let b0 = buf[0];
        let b1 = buf[1];
        let fin = b0 & 0x80 != 0;
        let opcode = b0 & 0x0F;
        if b0 & 0x70 != 0 {
            return Err(protocol_error("reserved bits set without a negotiated extension"));
        }
        if b1 & 0x80 != 0 {
            return Err(protocol_error("server frames must not be masked"));
        }
        let (payload_len, header_len) = match b1 & 0x7F {
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
            }
            127 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut len = [0u8; 8];
                len.copy_from_slice(&buf[2..10]);
                (u64::from_be_bytes(len), 10)
            }
            n => (n as u64, 2),
        };
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(protocol_error(format!("frame payload too large: {}", payload_len)));
        }
        let is_control = opcode & 0x08 != 0;
        if is_control && (!fin || payload_len > MAX_CONTROL_PAYLOAD as u64) {
            return Err(protocol_error("control frames must be final and at most 125 bytes"));
        }
        let total = header_len + payload_len as usize;
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }
        buf.advance(header_len);
        let payload = buf.split_to(payload_len as usize).freeze();
        let frame = decode_payload(opcode, fin, payload)?;
        self.frames_parsed += 1;
        Ok(Some(frame))
    }
}

fn decode_payload(opcode: u8, fin: bool, payload: Bytes) -> io::Result<Frame> {
    match opcode {
        OP_TEXT if fin => {
            let text = String::from_utf8(payload.to_vec())
                .map_err(|_| protocol_error("invalid UTF-8 in text frame"))?;
            Ok(Frame::Text(text))
        }
        OP_BINARY if fin => Ok(Frame::Binary(payload)),
        OP_TEXT | OP_BINARY | OP_CONTINUATION => Ok(Frame::Fragment { opcode, fin, payload }),
        OP_PING => Ok(Frame::Ping(payload)),
        OP_PONG => Ok(Frame::Pong(payload)),
        OP_CLOSE => match payload.len() {
            0 => Ok(Frame::Close { code: None, reason: String::new() }),
            1 => Err(protocol_error("close frame payload of one byte")),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                let reason = std::str::from_utf8(&payload[2..])
                    .map_err(|_| protocol_error("invalid UTF-8 in close reason"))?
                    .to_string();
                Ok(Frame::Close { code: Some(code), reason })
            }
        },
        other => Err(protocol_error(format!("reserved opcode {:#x}", other))),
    }
}
