//! Raw-Ethernet transport: the byte-level boundary the framer sends
//! through and the background receive loop that feeds it frames.
//!
//! MAC resolution follows the source's fallback chain: try the OS
//! interface address, then (for a VLAN sub-interface named `parent.vlan`)
//! retry against the parent interface, else fail.

use std::fmt;
use std::fs;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::metrics::Metrics;

pub const ETHERTYPE_AVTP: u16 = 0x22F0;

/// A 6-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);
    pub const ZERO: MacAddr = MacAddr([0x00; 6]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(CoreError::MacUnavailable(s.to_string()));
        }
        for (slot, part) in out.iter_mut().zip(parts.iter()) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| CoreError::MacUnavailable(s.to_string()))?;
        }
        Ok(MacAddr(out))
    }
}

/// Reads `/sys/class/net/{iface}/address`, the OS-reported MAC.
fn read_sys_mac(iface: &str) -> Option<MacAddr> {
    let path = format!("/sys/class/net/{iface}/address");
    let contents = fs::read_to_string(path).ok()?;
    let mac: MacAddr = contents.trim().parse().ok()?;
    if mac.is_zero() {
        None
    } else {
        Some(mac)
    }
}

/// Resolves the source MAC for `iface`, falling back to the parent
/// interface of a VLAN sub-interface (`eth0.100` -> `eth0`), per §4.2.
pub fn resolve_src_mac(iface: &str) -> CoreResult<MacAddr> {
    if let Some(mac) = read_sys_mac(iface) {
        return Ok(mac);
    }
    if let Some((parent, _vlan)) = iface.split_once('.') {
        if let Some(mac) = read_sys_mac(parent) {
            return Ok(mac);
        }
    }
    Err(CoreError::MacUnavailable(iface.to_string()))
}

/// The fixed byte-level boundary the framer needs: send a complete
/// Ethernet frame, and accept a background callback for inbound frames.
/// Implementations own the actual socket; this crate ships
/// [`RawEthernetPort`] for Linux raw sockets plus any OS glue an embedder
/// supplies through its own implementation.
pub trait EthernetPort: Send + Sync {
    /// Sends one complete Ethernet frame (header included).
    fn send(&self, frame: &[u8]) -> CoreResult<()>;

    /// The resolved source MAC address of the bound interface.
    fn local_mac(&self) -> MacAddr;

    /// Starts a background receive loop invoking `callback` with each
    /// accepted frame's bytes. `filter_stream_id` toggles stream-id
    /// filtering (off during discovery, on in normal operation); the
    /// stream id to filter against is fixed at port construction.
    fn start_receiving(&self, filter_stream_id: bool, callback: RecvCallback) -> CoreResult<()>;

    /// Cooperatively stops the receive loop, joining with a 5 s bound.
    fn stop_receiving(&self);
}

pub type RecvCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Raw L2 socket bound to one interface. The actual `AF_PACKET` socket
/// plumbing is left to the `sys` field so this crate does not hard-code a
/// platform-specific raw-socket crate; callers construct a `RawSocket`
/// implementation (e.g. backed by `socket2`/`libc` on Linux) and hand it
/// here.
pub struct RawEthernetPort<S: RawSocket> {
    iface: String,
    local_mac: MacAddr,
    stream_id: u64,
    sys: Arc<S>,
    running: Arc<AtomicBool>,
    receiver: std::sync::Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

/// Minimal platform boundary for an `AF_PACKET`-style raw socket: send a
/// whole frame, and block until one arrives.
pub trait RawSocket: Send + Sync + 'static {
    fn send_frame(&self, frame: &[u8]) -> std::io::Result<()>;
    fn recv_frame(&self) -> std::io::Result<Vec<u8>>;
}

impl<S: RawSocket> RawEthernetPort<S> {
    pub fn new(iface: &str, stream_id: u64, sys: S, metrics: Arc<Metrics>) -> CoreResult<Self> {
        let local_mac = resolve_src_mac(iface)?;
        Ok(Self {
            iface: iface.to_string(),
            local_mac,
            stream_id,
            sys: Arc::new(sys),
            running: Arc::new(AtomicBool::new(false)),
            receiver: std::sync::Mutex::new(None),
            metrics,
        })
    }

    pub fn iface(&self) -> &str {
        &self.iface
    }
}

impl<S: RawSocket> EthernetPort for RawEthernetPort<S> {
    fn send(&self, frame: &[u8]) -> CoreResult<()> {
        match self.sys.send_frame(frame) {
            Ok(()) => {
                self.metrics.mark_tx(frame.len());
                Ok(())
            }
            Err(e) => {
                self.metrics.mark_tx_error();
                Err(CoreError::InterfaceOpenFailed(self.iface.clone(), e.to_string()))
            }
        }
    }

    fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    fn start_receiving(&self, filter_stream_id: bool, callback: RecvCallback) -> CoreResult<()> {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let stream_id = self.stream_id;
        let metrics = Arc::clone(&self.metrics);
        let sys = Arc::clone(&self.sys);
        let handle = std::thread::spawn(move || {
            recv_loop(sys.as_ref(), &running, stream_id, filter_stream_id, &metrics, &callback);
        });
        *self.receiver.lock().unwrap() = Some(handle);
        Ok(())
    }

    fn stop_receiving(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.receiver.lock().unwrap().take();
        if let Some(handle) = handle {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = handle.join();
                let _ = tx.send(());
            });
            if rx.recv_timeout(Duration::from_secs(5)).is_err() {
                warn!("receiver thread did not stop within 5s");
                self.metrics.mark_receiver_shutdown_timeout();
            }
        }
    }
}

fn recv_loop<S: RawSocket>(
    sys: &S,
    running: &AtomicBool,
    stream_id: u64,
    filter_stream_id: bool,
    metrics: &Metrics,
    callback: &RecvCallback,
) {
    while running.load(Ordering::SeqCst) {
        let frame = match sys.recv_frame() {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "raw recv error, continuing");
                continue;
            }
        };
        metrics.mark_rx(frame.len());
        if filter_stream_id {
            if let Some(sid) = crate::avtp::peek_stream_id(&frame) {
                if sid != stream_id {
                    metrics.rx_drops_stream_id.incr();
                    continue;
                }
            }
        }
        callback(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_display_and_parse_round_trip() {
        let mac = MacAddr([0x82, 0x7B, 0xC4, 0xB1, 0x92, 0xF2]);
        let text = mac.to_string();
        assert_eq!(text, "82:7B:C4:B1:92:F2");
        assert_eq!(text.parse::<MacAddr>().unwrap(), mac);
    }

    #[test]
    fn zero_mac_parses_but_reports_zero() {
        let mac: MacAddr = "00:00:00:00:00:00".parse().unwrap();
        assert!(mac.is_zero());
    }

    #[test]
    fn malformed_mac_text_is_rejected() {
        assert!("not-a-mac".parse::<MacAddr>().is_err());
    }
}
