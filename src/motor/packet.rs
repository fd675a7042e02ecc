//! Wire framing for the two servo bus protocols.
//!
//! Feetech STS servos speak the classic `FF FF id len inst .. ~sum` framing;
//! Dynamixel X servos speak protocol 2.0 with a four-byte header and CRC-16.
//! Both share the same instruction numbers for the group transactions. The
//! parsers are incremental: feed them the receive buffer as it fills, they
//! skip garbage until a valid header and report how many bytes they consumed.

/// Ping instruction
pub const INST_PING: u8 = 0x01;
/// Single-register read
pub const INST_READ: u8 = 0x02;
/// Single-register write
pub const INST_WRITE: u8 = 0x03;
/// Group read, one status packet per listed motor
pub const INST_SYNC_READ: u8 = 0x82;
/// Group write, no status reply
pub const INST_SYNC_WRITE: u8 = 0x83;
/// Broadcast id used by the group transactions
pub const BROADCAST_ID: u8 = 0xFE;

/// A status (reply) packet from one servo, framing already stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    /// Responding servo id
    pub id: u8,
    /// Hardware error byte, zero when healthy
    pub error: u8,
    /// Payload bytes
    pub params: Vec<u8>,
}

/// Result of feeding bytes to an incremental status parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A full valid packet; `consumed` bytes can be dropped from the buffer
    Complete { packet: StatusPacket, consumed: usize },
    /// No complete packet yet; drop `consumed` leading garbage bytes and
    /// read more from the wire
    NeedMore { consumed: usize },
    /// A framed packet failed its checksum; drop `consumed` bytes and rescan
    Corrupt { consumed: usize },
}

/// Feetech STS protocol-0 framing
pub mod feetech {
    use super::{ParseOutcome, StatusPacket, BROADCAST_ID, INST_READ, INST_SYNC_READ, INST_SYNC_WRITE, INST_WRITE};

    fn checksum(bytes: &[u8]) -> u8 {
        let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
        !(sum as u8)
    }

    /// Build an instruction packet: `FF FF id len inst params ~sum`
    pub fn instruction_packet(id: u8, instruction: u8, params: &[u8]) -> Vec<u8> {
        let len = (params.len() + 2) as u8;
        let mut packet = Vec::with_capacity(params.len() + 6);
        packet.extend_from_slice(&[0xFF, 0xFF, id, len, instruction]);
        packet.extend_from_slice(params);
        packet.push(checksum(&packet[2..]));
        packet
    }

    /// Single-register read request
    pub fn read(id: u8, address: u8, width: u8) -> Vec<u8> {
        instruction_packet(id, INST_READ, &[address, width])
    }

    /// Single-register write request
    pub fn write(id: u8, address: u8, data: &[u8]) -> Vec<u8> {
        let mut params = Vec::with_capacity(data.len() + 1);
        params.push(address);
        params.extend_from_slice(data);
        instruction_packet(id, INST_WRITE, &params)
    }

    /// Group read request; each listed servo answers with its own status packet
    pub fn sync_read(address: u8, width: u8, ids: &[u8]) -> Vec<u8> {
        let mut params = Vec::with_capacity(ids.len() + 2);
        params.push(address);
        params.push(width);
        params.extend_from_slice(ids);
        instruction_packet(BROADCAST_ID, INST_SYNC_READ, &params)
    }

    /// Group write request, no reply. `entries` carries (id, field bytes)
    /// pairs; every field must be `width` bytes.
    pub fn sync_write(address: u8, width: u8, entries: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut params = Vec::with_capacity(2 + entries.len() * (width as usize + 1));
        params.push(address);
        params.push(width);
        for (id, data) in entries {
            debug_assert_eq!(data.len(), width as usize);
            params.push(*id);
            params.extend_from_slice(data);
        }
        instruction_packet(BROADCAST_ID, INST_SYNC_WRITE, &params)
    }

    /// Incremental status parser: `FF FF id len err params ~sum`
    pub fn parse_status(buf: &[u8]) -> ParseOutcome {
        let mut start = 0;
        // Resync on the first FF FF pair followed by a plausible id
        while start + 1 < buf.len() {
            if buf[start] == 0xFF && buf[start + 1] == 0xFF {
                break;
            }
            start += 1;
        }
        if start + 4 >= buf.len() {
            return ParseOutcome::NeedMore { consumed: start };
        }
        let id = buf[start + 2];
        let len = buf[start + 3] as usize;
        if id == 0xFF || len < 2 {
            // Not a packet header, skip one byte and rescan
            return ParseOutcome::Corrupt { consumed: start + 1 };
        }
        let total = start + 4 + len;
        if buf.len() < total {
            return ParseOutcome::NeedMore { consumed: start };
        }
        let body = &buf[start + 2..total - 1];
        let expected = {
            let sum: u32 = body.iter().map(|&b| u32::from(b)).sum();
            !(sum as u8)
        };
        if buf[total - 1] != expected {
            return ParseOutcome::Corrupt { consumed: start + 2 };
        }
        ParseOutcome::Complete {
            packet: StatusPacket {
                id,
                error: buf[start + 4],
                params: buf[start + 5..total - 1].to_vec(),
            },
            consumed: total,
        }
    }
}

/// Dynamixel protocol-2.0 framing
pub mod dynamixel {
    use super::{ParseOutcome, StatusPacket, BROADCAST_ID, INST_READ, INST_SYNC_READ, INST_SYNC_WRITE, INST_WRITE};

    /// Status packet instruction byte
    pub const INST_STATUS: u8 = 0x55;

    /// CRC-16 with polynomial 0x8005, as specified by protocol 2.0
    pub fn crc16(data: &[u8]) -> u16 {
        let mut crc: u16 = 0;
        for &byte in data {
            crc ^= u16::from(byte) << 8;
            for _ in 0..8 {
                if crc & 0x8000 != 0 {
                    crc = (crc << 1) ^ 0x8005;
                } else {
                    crc <<= 1;
                }
            }
        }
        crc
    }

    /// Build an instruction packet:
    /// `FF FF FD 00 id len_l len_h inst params crc_l crc_h`
    pub fn instruction_packet(id: u8, instruction: u8, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 3) as u16;
        let mut packet = Vec::with_capacity(params.len() + 10);
        packet.extend_from_slice(&[0xFF, 0xFF, 0xFD, 0x00, id]);
        packet.extend_from_slice(&length.to_le_bytes());
        packet.push(instruction);
        packet.extend_from_slice(params);
        let crc = crc16(&packet);
        packet.extend_from_slice(&crc.to_le_bytes());
        packet
    }

    /// Single-register read request
    pub fn read(id: u8, address: u16, width: u16) -> Vec<u8> {
        let mut params = Vec::with_capacity(4);
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(&width.to_le_bytes());
        instruction_packet(id, INST_READ, &params)
    }

    /// Single-register write request
    pub fn write(id: u8, address: u16, data: &[u8]) -> Vec<u8> {
        let mut params = Vec::with_capacity(data.len() + 2);
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(data);
        instruction_packet(id, INST_WRITE, &params)
    }

    /// Group read request; each listed servo answers in id order
    pub fn sync_read(address: u16, width: u16, ids: &[u8]) -> Vec<u8> {
        let mut params = Vec::with_capacity(ids.len() + 4);
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(&width.to_le_bytes());
        params.extend_from_slice(ids);
        instruction_packet(BROADCAST_ID, INST_SYNC_READ, &params)
    }

    /// Group write request, no reply
    pub fn sync_write(address: u16, width: u16, entries: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut params = Vec::with_capacity(4 + entries.len() * (width as usize + 1));
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(&width.to_le_bytes());
        for (id, data) in entries {
            debug_assert_eq!(data.len(), width as usize);
            params.push(*id);
            params.extend_from_slice(data);
        }
        instruction_packet(BROADCAST_ID, INST_SYNC_WRITE, &params)
    }

    /// Incremental status parser:
    /// `FF FF FD 00 id len_l len_h 0x55 err params crc_l crc_h`
    pub fn parse_status(buf: &[u8]) -> ParseOutcome {
        let mut start = 0;
        while start + 3 < buf.len() {
            if buf[start] == 0xFF && buf[start + 1] == 0xFF && buf[start + 2] == 0xFD && buf[start + 3] == 0x00 {
                break;
            }
            start += 1;
        }
        if start + 7 >= buf.len() {
            return ParseOutcome::NeedMore { consumed: start };
        }
        let id = buf[start + 4];
        let length = u16::from_le_bytes([buf[start + 5], buf[start + 6]]) as usize;
        if length < 4 {
            return ParseOutcome::Corrupt { consumed: start + 4 };
        }
        let total = start + 7 + length;
        if buf.len() < total {
            return ParseOutcome::NeedMore { consumed: start };
        }
        let crc = u16::from_le_bytes([buf[total - 2], buf[total - 1]]);
        if crc16(&buf[start..total - 2]) != crc {
            return ParseOutcome::Corrupt { consumed: start + 4 };
        }
        if buf[start + 7] != INST_STATUS {
            return ParseOutcome::Corrupt { consumed: total };
        }
        ParseOutcome::Complete {
            packet: StatusPacket {
                id,
                error: buf[start + 8],
                params: buf[start + 9..total - 2].to_vec(),
            },
            consumed: total,
        }
    }
}
