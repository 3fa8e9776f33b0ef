//! AVTP NTSCF framing and ACF-CAN Brief block encoding/decoding.
//!
//! A frame is an Ethernet header, a 12-byte AVTP common header (subtype,
//! sv/version/control byte, data_length, sequence number, 64-bit stream
//! id), followed by one or more concatenated ACF-CAN Brief blocks.
//! `data_length` is wire-packed at its own byte (the ACF payload's
//! length) and checked against the frame's actual trailing length at
//! parse time, per the source's `AVTPPacket` field layout.

use crate::metrics::Metrics;
use crate::transport::{MacAddr, ETHERTYPE_AVTP};

pub const AVTP_SUBTYPE_NTSCF: u8 = 0x82;
const ACF_MSG_TYPE_CAN_BRIEF: u8 = 0b010;

const ETH_HEADER_LEN: usize = 14;
const AVTP_HEADER_LEN: usize = 12;
pub const MIN_FRAME_LEN: usize = ETH_HEADER_LEN + AVTP_HEADER_LEN;

/// One decoded ACF-CAN Brief block.
#[derive(Debug, Clone, PartialEq)]
pub struct AcfCanBrief {
    pub bus_id: u8,
    pub can_id: u32,
    pub data: Vec<u8>,
    pub extended: bool,
    pub fdf: bool,
    pub brs: bool,
    pub esi: bool,
    pub timestamp_valid: bool,
}

impl AcfCanBrief {
    fn padded_len(&self) -> usize {
        let total = 8 + self.data.len();
        total.div_ceil(4) * 4
    }

    fn length_quadlets(&self) -> u16 {
        (self.padded_len() / 4) as u16
    }
}

/// Serializes one ACF-CAN Brief block: 2-byte header, 1-byte flags,
/// 1-byte bus id, 4-byte CAN id, data padded to a quadlet boundary.
pub fn build_acf_can_brief(block: &AcfCanBrief) -> Vec<u8> {
    let quadlets = block.length_quadlets();
    let header: u16 = ((ACF_MSG_TYPE_CAN_BRIEF as u16 & 0x7F) << 9) | (quadlets & 0x1FF);

    let padded_data_len = block.padded_len() - 8;
    let padding = padded_data_len - block.data.len();

    let mut flags: u8 = 0;
    flags |= (padding as u8 & 0x3) << 6;
    flags |= (block.timestamp_valid as u8) << 5;
    flags |= (block.extended as u8) << 3;
    flags |= (block.brs as u8) << 2;
    flags |= (block.fdf as u8) << 1;
    flags |= block.esi as u8;

    let mut out = Vec::with_capacity(block.padded_len());
    out.extend_from_slice(&header.to_be_bytes());
    out.push(flags);
    out.push(block.bus_id & 0x1F);
    out.extend_from_slice(&block.can_id.to_be_bytes());
    out.extend_from_slice(&block.data);
    out.resize(block.padded_len(), 0);
    out
}

/// Parses one ACF-CAN Brief block from the front of `buf`. Returns the
/// decoded block and the number of bytes consumed, or `None` if `buf` is
/// too short to hold even the 8-byte block header, or the declared
/// length would run past the end of `buf` (a truncated final block,
/// which is not an error — the caller stops iterating silently).
pub fn parse_can_brief(buf: &[u8]) -> Option<(AcfCanBrief, usize)> {
    if buf.len() < 8 {
        return None;
    }
    let header = u16::from_be_bytes([buf[0], buf[1]]);
    let msg_type = ((header >> 9) & 0x7F) as u8;
    if msg_type != ACF_MSG_TYPE_CAN_BRIEF {
        return None;
    }
    let quadlets = header & 0x1FF;
    let block_len = quadlets as usize * 4;
    if block_len < 8 || block_len > buf.len() {
        return None;
    }
    let flags = buf[2];
    let bus_id = buf[3] & 0x1F;
    let can_id = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let data = buf[8..block_len].to_vec();

    let block = AcfCanBrief {
        bus_id,
        can_id,
        data,
        extended: (flags >> 3) & 0x1 != 0,
        fdf: (flags >> 1) & 0x1 != 0,
        brs: (flags >> 2) & 0x1 != 0,
        esi: flags & 0x1 != 0,
        timestamp_valid: (flags >> 5) & 0x1 != 0,
    };
    Some((block, block_len))
}

/// Builds one AVTP NTSCF frame (Ethernet + AVTP header) carrying the
/// concatenation of `blocks`.
pub fn build_ntscf_frame(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    stream_id: u64,
    sequence: u8,
    blocks: &[AcfCanBrief],
) -> Vec<u8> {
    let mut payload = Vec::new();
    for block in blocks {
        payload.extend(build_acf_can_brief(block));
    }

    let mut frame = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
    frame.extend_from_slice(dst_mac.as_bytes());
    frame.extend_from_slice(src_mac.as_bytes());
    frame.extend_from_slice(&ETHERTYPE_AVTP.to_be_bytes());

    frame.push(AVTP_SUBTYPE_NTSCF);
    frame.push(0b1000_0000); // stream_valid=1, version=0, control_data=0
    frame.push(payload.len() as u8);
    frame.push(sequence);
    frame.extend_from_slice(&stream_id.to_be_bytes());

    frame.extend_from_slice(&payload);
    frame
}

/// One NTSCF frame, parsed down to its header fields and raw ACF payload.
#[derive(Debug, Clone)]
pub struct NtscfFrame<'a> {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub stream_id: u64,
    pub sequence: u8,
    pub acf_payload: &'a [u8],
}

/// Validates and parses the Ethernet + AVTP headers of `frame`, counting
/// the relevant `rx_drops_*` metric and returning `None` on any failure
/// per §4.2's failure semantics (never an error, always a dropped frame).
pub fn parse_ntscf_frame<'a>(frame: &'a [u8], metrics: &Metrics) -> Option<NtscfFrame<'a>> {
    if frame.len() < MIN_FRAME_LEN {
        metrics.rx_drops_short.incr();
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != ETHERTYPE_AVTP {
        metrics.rx_drops_ethertype.incr();
        return None;
    }
    let subtype = frame[14];
    if subtype != AVTP_SUBTYPE_NTSCF {
        metrics.rx_drops_subtype.incr();
        return None;
    }
    let data_length = frame[16] as usize;
    let sequence = frame[17];
    let stream_id = u64::from_be_bytes(frame[18..26].try_into().unwrap());

    let acf_payload = &frame[MIN_FRAME_LEN..];
    if data_length != acf_payload.len() {
        metrics.rx_drops_length.incr();
        return None;
    }

    let dst_mac = MacAddr(frame[0..6].try_into().unwrap());
    let src_mac = MacAddr(frame[6..12].try_into().unwrap());

    Some(NtscfFrame { dst_mac, src_mac, stream_id, sequence, acf_payload })
}

/// Iterates the ACF-CAN blocks in `payload`, yielding each successfully
/// parsed block. Stops (without error) at the first block that does not
/// parse, matching the "truncated final block -> stop" rule.
pub fn iter_acf_blocks<'a>(payload: &'a [u8], metrics: &'a Metrics) -> impl Iterator<Item = AcfCanBrief> + 'a {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset >= payload.len() {
            return None;
        }
        match parse_can_brief(&payload[offset..]) {
            Some((block, consumed)) => {
                offset += consumed;
                Some(block)
            }
            None => {
                if offset < payload.len() {
                    metrics.rx_drops_length.incr();
                }
                offset = payload.len();
                None
            }
        }
    })
}

/// Peeks the stream id out of a raw frame without fully validating it,
/// used by the receiver loop's cheap stream-id pre-filter. Returns
/// `None` if the frame is too short to contain one.
pub fn peek_stream_id(frame: &[u8]) -> Option<u64> {
    if frame.len() < MIN_FRAME_LEN {
        return None;
    }
    Some(u64::from_be_bytes(frame[18..26].try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block(can_id: u32, data: Vec<u8>) -> AcfCanBrief {
        AcfCanBrief {
            bus_id: 0,
            can_id,
            data,
            extended: true,
            fdf: true,
            brs: false,
            esi: false,
            timestamp_valid: false,
        }
    }

    #[test]
    fn acf_block_round_trips() {
        let block = sample_block(0x18FEF100, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let bytes = build_acf_can_brief(&block);
        assert_eq!(bytes.len(), 8 + 8);
        let (parsed, consumed) = parse_can_brief(&bytes).expect("parses");
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, block);
    }

    #[test]
    fn acf_block_pads_short_data_to_quadlet() {
        let block = sample_block(0x18FEF100, vec![1, 2, 3]);
        let bytes = build_acf_can_brief(&block);
        // 8 header bytes + 3 data bytes padded up to the next quadlet (4).
        assert_eq!(bytes.len(), 12);
        let (parsed, _) = parse_can_brief(&bytes).unwrap();
        assert_eq!(parsed.data.len(), 4);
        assert_eq!(&parsed.data[..3], &[1, 2, 3]);
        assert_eq!(parsed.data[3], 0);
    }

    #[test]
    fn length_quadlets_matches_spec_formula() {
        for len in 0..60usize {
            let block = sample_block(1, vec![0u8; len]);
            let expected = (8 + len).div_ceil(4);
            assert_eq!(block.length_quadlets() as usize, expected);
        }
    }

    #[test]
    fn ntscf_frame_round_trips_blocks() {
        let dst = MacAddr::BROADCAST;
        let src = MacAddr([0x82, 0x7B, 0xC4, 0xB1, 0x92, 0xF2]);
        let blocks = vec![
            sample_block(0x18FEF100, vec![1, 2, 3, 4, 5, 6, 7, 8]),
            sample_block(0x0CF00400, vec![9, 9]),
        ];
        let frame = build_ntscf_frame(dst, src, 0xDEADBEEF_0000_0001, 7, &blocks);
        let metrics = Metrics::new();
        let parsed = parse_ntscf_frame(&frame, &metrics).expect("parses");
        assert_eq!(parsed.dst_mac, dst);
        assert_eq!(parsed.src_mac, src);
        assert_eq!(parsed.sequence, 7);
        assert_eq!(parsed.stream_id, 0xDEADBEEF_0000_0001);

        let decoded: Vec<_> = iter_acf_blocks(parsed.acf_payload, &metrics).collect();
        assert_eq!(decoded, blocks);
        assert_eq!(metrics.snapshot().rx_drops_length, 0);
    }

    #[test]
    fn short_frame_is_dropped_with_metric() {
        let metrics = Metrics::new();
        let frame = vec![0u8; 10];
        assert!(parse_ntscf_frame(&frame, &metrics).is_none());
        assert_eq!(metrics.snapshot().rx_drops_short, 1);
    }

    #[test]
    fn wrong_ethertype_is_dropped() {
        let dst = MacAddr::BROADCAST;
        let src = MacAddr::ZERO;
        let mut frame = build_ntscf_frame(dst, src, 0, 0, &[]);
        frame[12] = 0x08;
        frame[13] = 0x00;
        let metrics = Metrics::new();
        assert!(parse_ntscf_frame(&frame, &metrics).is_none());
        assert_eq!(metrics.snapshot().rx_drops_ethertype, 1);
    }

    #[test]
    fn malformed_acf_block_length_drops_without_panic() {
        // A single ACF block claiming more data than actually follows it.
        let block = sample_block(1, vec![0u8; 60]);
        let mut bytes = build_acf_can_brief(&block);
        bytes.truncate(bytes.len() - 40); // now shorter than length_quadlets says
        let metrics = Metrics::new();
        let decoded: Vec<_> = iter_acf_blocks(&bytes, &metrics).collect();
        assert!(decoded.is_empty());
        assert_eq!(metrics.snapshot().rx_drops_length, 1);
    }

    #[test]
    fn malformed_avtp_data_length_drops_without_panic() {
        // §8 scenario 6: the header claims 200 bytes of ACF payload but
        // only 60 actually follow.
        let blocks = vec![sample_block(0x18FEF100, vec![0u8; 52])]; // 60-byte payload once framed
        let mut frame = build_ntscf_frame(MacAddr::BROADCAST, MacAddr::ZERO, 1, 0, &blocks);
        assert_eq!(frame.len() - MIN_FRAME_LEN, 60);
        frame[16] = 200;
        let metrics = Metrics::new();
        assert!(parse_ntscf_frame(&frame, &metrics).is_none());
        assert_eq!(metrics.snapshot().rx_drops_length, 1);
    }
}
