/*
 * frame.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a local application server.
 *
 * This file is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This file is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this file.  If not, see <http://www.gnu.org/licenses/>.
 */

//! WebSocket frame format (RFC 6455 §5): parser for receive (client frames,
//! masked), encoder for send (server frames, never masked).

use bytes::{Buf, BufMut, BytesMut};
use std::io;

// Opcodes
pub const OP_CONTINUATION: u8 = 0;
pub const OP_TEXT: u8 = 1;
pub const OP_BINARY: u8 = 2;
pub const OP_CLOSE: u8 = 8;
pub const OP_PING: u8 = 9;
pub const OP_PONG: u8 = 10;

/// Max payload length we accept for data frames (16 MiB; the upstream proxy
/// is trusted, the cap only bounds memory on a broken peer). Control frames
/// are ≤125 per RFC.
pub const MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;

/// Callback for completed frames (receive path). Payload is already unmasked.
pub trait FrameHandler {
    fn frame(&mut self, opcode: u8, fin: bool, data: &[u8]);
}

/// Push parser for WebSocket frames (client → server: mask required).
pub struct FrameParser {
    state: FrameState,
    opcode: u8,
    fin: bool,
    payload_len: u64,
    mask_key: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Header1,
    ExtendedLen2,
    ExtendedLen8,
    MaskKey,
    Payload,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: FrameState::Header1,
            opcode: 0,
            fin: false,
            payload_len: 0,
            mask_key: [0; 4],
        }
    }

    /// Feed bytes from the stream. Returns Ok(()) when more data is needed or
    /// a frame was dispatched.
    pub fn receive<H: FrameHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), io::Error> {
        loop {
            match self.state {
                FrameState::Header1 => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    let b0 = buf.get_u8();
                    let b1 = buf.get_u8();
                    self.fin = (b0 & 0x80) != 0;
                    self.opcode = b0 & 0x0f;
                    let mask = (b1 & 0x80) != 0;
                    let len7 = b1 & 0x7f;
                    if !mask {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "client frame must be masked",
                        ));
                    }
                    if len7 == 126 {
                        self.state = FrameState::ExtendedLen2;
                    } else if len7 == 127 {
                        self.state = FrameState::ExtendedLen8;
                    } else {
                        self.payload_len = len7 as u64;
                        self.state = FrameState::MaskKey;
                    }
                }
                FrameState::ExtendedLen2 => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    self.payload_len = buf.get_u16() as u64;
                    self.state = FrameState::MaskKey;
                }
                FrameState::ExtendedLen8 => {
                    if buf.len() < 8 {
                        return Ok(());
                    }
                    self.payload_len = buf.get_u64();
                    self.state = FrameState::MaskKey;
                }
                FrameState::MaskKey => {
                    if buf.len() < 4 {
                        return Ok(());
                    }
                    buf.copy_to_slice(&mut self.mask_key);
                    self.state = FrameState::Payload;
                }
                FrameState::Payload => {
                    let need = self.payload_len as usize;
                    let is_control = self.opcode == OP_CLOSE
                        || self.opcode == OP_PING
                        || self.opcode == OP_PONG;
                    if is_control && need > 125 {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "control frame payload too long",
                        ));
                    }
                    if !is_control && need > MAX_FRAME_PAYLOAD {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "data frame payload too long",
                        ));
                    }
                    if need == 0 {
                        // Empty payload (e.g. ping with no data)
                        handler.frame(self.opcode, self.fin, &[]);
                        self.state = FrameState::Header1;
                        continue;
                    }
                    if buf.len() < need {
                        return Ok(());
                    }
                    let mut payload = buf.split_to(need);
                    // Unmask in place: XOR with the repeating 4-byte key
                    for (i, b) in payload.iter_mut().enumerate() {
                        *b ^= self.mask_key[i % 4];
                    }
                    handler.frame(self.opcode, self.fin, &payload);
                    self.state = FrameState::Header1;
                    continue;
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one frame (server → client: never masked).
pub fn encode_frame(opcode: u8, fin: bool, payload: &[u8], out: &mut BytesMut) {
    let len = payload.len();
    let fin_bit: u8 = if fin { 0x80 } else { 0 };
    out.put_u8(fin_bit | (opcode & 0x0f));
    if len < 126 {
        out.put_u8(len as u8);
    } else if len < 65536 {
        out.put_u8(126);
        out.put_u16(len as u16);
    } else {
        out.put_u8(127);
        out.put_u64(len as u64);
    }
    out.put_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect(Vec<(u8, bool, Vec<u8>)>);

    impl FrameHandler for Collect {
        fn frame(&mut self, opcode: u8, fin: bool, data: &[u8]) {
            self.0.push((opcode, fin, data.to_vec()));
        }
    }

    /// Mask a server-encoded frame so the parser (which demands client
    /// masking) will accept it back.
    fn masked(opcode: u8, payload: &[u8]) -> BytesMut {
        let key = [0x12u8, 0x34, 0x56, 0x78];
        let mut out = BytesMut::new();
        let len = payload.len();
        out.put_u8(0x80 | opcode);
        if len < 126 {
            out.put_u8(0x80 | len as u8);
        } else if len < 65536 {
            out.put_u8(0x80 | 126);
            out.put_u16(len as u16);
        } else {
            out.put_u8(0x80 | 127);
            out.put_u64(len as u64);
        }
        out.put_slice(&key);
        for (i, &b) in payload.iter().enumerate() {
            out.put_u8(b ^ key[i % 4]);
        }
        out
    }

    #[test]
    fn masked_roundtrip_boundary_sizes() {
        for size in [0usize, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let mut buf = masked(OP_BINARY, &payload);
            let mut parser = FrameParser::new();
            let mut h = Collect(Vec::new());
            parser.receive(&mut buf, &mut h).unwrap();
            assert_eq!(h.0.len(), 1, "size {}", size);
            let (opcode, fin, data) = &h.0[0];
            assert_eq!(*opcode, OP_BINARY);
            assert!(*fin);
            assert_eq!(data, &payload);
        }
    }

    #[test]
    fn server_frames_encode_unmasked_length_variants() {
        for size in [0usize, 125, 126, 65535, 65536] {
            let payload = vec![0xA5u8; size];
            let mut out = BytesMut::new();
            encode_frame(OP_TEXT, true, &payload, &mut out);
            assert_eq!(out[0], 0x80 | OP_TEXT);
            // Mask bit must be clear on server frames
            assert_eq!(out[1] & 0x80, 0);
            let header_len = if size < 126 {
                2
            } else if size < 65536 {
                4
            } else {
                10
            };
            assert_eq!(out.len(), header_len + size);
            assert_eq!(&out[header_len..], &payload[..]);
        }
    }

    #[test]
    fn unmasked_client_frame_rejected() {
        let mut buf = BytesMut::new();
        encode_frame(OP_TEXT, true, b"hi", &mut buf);
        let mut parser = FrameParser::new();
        let mut h = Collect(Vec::new());
        assert!(parser.receive(&mut buf, &mut h).is_err());
    }

    #[test]
    fn partial_frame_resumes() {
        let payload = b"hello world".to_vec();
        let full = masked(OP_TEXT, &payload);
        let mut parser = FrameParser::new();
        let mut h = Collect(Vec::new());
        let mut buf = BytesMut::from(&full[..5]);
        parser.receive(&mut buf, &mut h).unwrap();
        assert!(h.0.is_empty());
        buf.extend_from_slice(&full[5..]);
        parser.receive(&mut buf, &mut h).unwrap();
        assert_eq!(h.0[0].2, payload);
    }

    #[test]
    fn oversized_control_frame_rejected() {
        let payload = vec![0u8; 126];
        let mut buf = masked(OP_PING, &payload);
        let mut parser = FrameParser::new();
        let mut h = Collect(Vec::new());
        assert!(parser.receive(&mut buf, &mut h).is_err());
    }
}
