//! Discovery (C7): elicit MODULE_INFO/MODULE_INFO_EX responses from
//! every module on the segment and populate the [`Registry`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::avtp::{build_ntscf_frame, iter_acf_blocks, parse_ntscf_frame, AcfCanBrief};
use crate::dbc::Codec;
use crate::id;
use crate::metrics::Metrics;
use crate::pgn;
use crate::registry::{ModuleInfo, Registry};
use crate::transport::{EthernetPort, MacAddr};

const DISCOVERY_FRAME_COUNT: usize = 3;
const DISCOVERY_FRAME_SPACING: Duration = Duration::from_millis(50);
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Decodes a MODULE_INFO / MODULE_INFO_EX signal set (as produced by the
/// DBC codec) into a [`ModuleInfo`]. Firmware-name tri-quads are 8-byte
/// little-endian integers reinterpreted as ASCII and concatenated, per
/// the source's `ModuleInfoMessage.from_decoded`.
fn module_info_from_signals(signals: &std::collections::HashMap<String, f64>) -> ModuleInfo {
    let name_part = |key: &str| -> String {
        let raw = signals.get(key).copied().unwrap_or(0.0) as u64;
        String::from_utf8_lossy(&raw.to_le_bytes()).trim_end_matches('\0').to_string()
    };
    let app_name = format!(
        "{}{}{}",
        name_part("module_app_fw_name_1"),
        name_part("module_app_fw_name_2"),
        name_part("module_app_fw_name_3")
    );
    let hw_name = format!("{}{}", name_part("module_hw_name_1"), name_part("module_hw_name_2"));

    let field = |key: &str| signals.get(key).copied().unwrap_or(0.0) as u32;
    let version = format!(
        "{}.{}.{}.{}.{}",
        field("module_app_gen"),
        field("module_app_major"),
        field("module_app_minor"),
        field("module_app_fix"),
        field("module_app_build")
    );
    let build_date = format!(
        "{:02}-{:02}-{:04} {:02}:{:02}",
        field("module_app_build_day"),
        field("module_app_build_month"),
        field("module_app_build_year"),
        field("module_app_build_hour"),
        field("module_app_build_min")
    );
    let crc = signals.get("module_app_crc").copied().unwrap_or(0.0) as u32;

    let ip_address = signals.get("module_ip_address").map(|v| (*v as u32).to_be_bytes());
    let chip_uid = match (signals.get("module_chip_uid_hi"), signals.get("module_chip_uid_lo")) {
        (Some(hi), Some(lo)) => Some((*hi as u64, *lo as u64)),
        _ => None,
    };

    ModuleInfo {
        mac: None,
        app_name,
        hw_name,
        version,
        build_date,
        crc,
        ip_address,
        chip_uid,
        last_seen: None,
        message_count: 0,
        error_count: 0,
    }
}

/// Runs discovery: with stream-id filtering disabled, transmits three
/// broadcast discovery frames ~50 ms apart, then waits `timeout` while
/// inbound MODULE_INFO/MODULE_INFO_EX traffic populates `registry`.
/// Returns the registry's snapshot afterward. An empty result is not an
/// error (§7).
///
/// Frames are buffered from the receiver thread and decoded here, after
/// `timeout` elapses, since the DBC codec is not `'static` and cannot be
/// captured by the background callback; this mirrors the source's own
/// two-phase "collect, then parse" discovery loop.
pub fn discover(
    transport: &dyn EthernetPort,
    codec: &Codec,
    registry: &Arc<Registry>,
    metrics: &Arc<Metrics>,
    stream_id: u64,
    timeout: Duration,
) -> std::collections::HashMap<MacAddr, ModuleInfo> {
    let sequence = AtomicU64::new(0);
    let buffer: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let buffer_for_cb = Arc::clone(&buffer);
    let callback: crate::transport::RecvCallback = Arc::new(move |frame: &[u8]| {
        buffer_for_cb.lock().unwrap().push(frame.to_vec());
    });

    if let Err(e) = transport.start_receiving(false, callback) {
        debug!(error = %e, "discovery could not start receiver");
        return registry.snapshot();
    }

    let local_mac = transport.local_mac();
    for i in 0..DISCOVERY_FRAME_COUNT {
        let block = AcfCanBrief {
            bus_id: 0,
            can_id: id::build(pgn::MODULE_INFO_REQ, 0x00, 0xFF, 3),
            data: vec![0u8; 8],
            extended: true,
            fdf: true,
            brs: false,
            esi: false,
            timestamp_valid: false,
        };
        let seq = sequence.fetch_add(1, Ordering::SeqCst) as u8;
        let frame = build_ntscf_frame(MacAddr::BROADCAST, local_mac, stream_id, seq, &[block]);
        if let Err(e) = transport.send(&frame) {
            debug!(error = %e, "discovery frame {i} failed to send");
        }
        if i + 1 < DISCOVERY_FRAME_COUNT {
            std::thread::sleep(DISCOVERY_FRAME_SPACING);
        }
    }

    std::thread::sleep(timeout);
    transport.stop_receiving();

    for frame in buffer.lock().unwrap().drain(..) {
        let Some(parsed) = parse_ntscf_frame(&frame, metrics) else { continue };
        for block in iter_acf_blocks(parsed.acf_payload, metrics) {
            let pgn_value = id::extract_pgn(block.can_id);
            if pgn_value != pgn::MODULE_INFO_ANS && pgn_value != pgn::MODULE_INFO_EX {
                continue;
            }
            let signals = codec.decode(block.can_id, &block.data);
            if signals.is_empty() {
                metrics.mark_decode_drop();
                continue;
            }
            let info = module_info_from_signals(&signals);
            registry.record(parsed.src_mac, info);
        }
    }

    registry.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbc::Catalog;
    use std::sync::Mutex as StdMutex;

    struct FakePort {
        sent: StdMutex<Vec<Vec<u8>>>,
        local: MacAddr,
    }

    impl EthernetPort for FakePort {
        fn send(&self, frame: &[u8]) -> crate::error::CoreResult<()> {
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
        fn local_mac(&self) -> MacAddr {
            self.local
        }
        fn start_receiving(&self, _filter: bool, _cb: crate::transport::RecvCallback) -> crate::error::CoreResult<()> {
            Ok(())
        }
        fn stop_receiving(&self) {}
    }

    #[test]
    fn discovery_sends_exactly_three_broadcast_frames() {
        let port = FakePort { sent: StdMutex::new(Vec::new()), local: MacAddr([1, 2, 3, 4, 5, 6]) };
        let codec = Codec::new(Catalog::default());
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new());

        let result = discover(&port, &codec, &registry, &metrics, 0x1234, Duration::from_millis(1));
        assert!(result.is_empty());
        assert_eq!(port.sent.lock().unwrap().len(), DISCOVERY_FRAME_COUNT);
        for frame in port.sent.lock().unwrap().iter() {
            assert_eq!(&frame[0..6], MacAddr::BROADCAST.as_bytes());
        }
    }
}
