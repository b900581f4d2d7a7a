//! Raw-socket EtherCAT round-trip tester.
//!
//! Opens an AF_PACKET socket bound to the interface, broadcasts a minimal
//! EtherCAT frame per `send`, and blocks in `recvmsg` per `receive`. RX
//! software and raw hardware timestamps are requested via `SO_TIMESTAMPING`;
//! their inter-frame deltas feed the HW/SW delta streams shown in verbose
//! mode.

use std::os::fd::RawFd;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::clock::timespec_to_ns;
use crate::nic::NicTester;
use crate::report::ReportData;

/// EtherCAT EtherType.
const ETH_P_ECAT: u16 = 0x88A4;

/// Minimum Ethernet payload; shorter frames are padded by hand so the wire
/// image is deterministic.
const MIN_FRAME_LEN: usize = 60;

/// Errors raised while setting up or driving the raw socket.
#[derive(Error, Debug)]
pub enum RawSocketError {
    #[error("opening AF_PACKET socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("interface {name} has no index: {source}")]
    InterfaceIndex {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("binding to interface {name}: {source}")]
    Bind {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sending frame: {0}")]
    Send(#[source] std::io::Error),

    #[error("receiving frame: {0}")]
    Receive(#[source] std::io::Error),
}

struct TimestampTracker {
    last_software_ns: Option<u64>,
    last_hardware_ns: Option<u64>,
}

/// Raw-socket EtherCAT frame round-trip.
pub struct RawSocketTester {
    fd: RawFd,
    frame: Vec<u8>,
    software: Arc<ReportData>,
    hardware: Arc<ReportData>,
    timestamps: Mutex<TimestampTracker>,
}

impl RawSocketTester {
    /// Open and bind the socket and pre-build the probe frame.
    ///
    /// `software` and `hardware` receive the RX timestamp deltas; they are
    /// recorded regardless of verbosity, rendering is the caller's choice.
    pub fn new(
        nic: &str,
        software: Arc<ReportData>,
        hardware: Arc<ReportData>,
    ) -> Result<Self, RawSocketError> {
        // SAFETY: socket() takes only scalars.
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                ETH_P_ECAT.to_be() as libc::c_int,
            )
        };
        if fd < 0 {
            return Err(RawSocketError::Socket(std::io::Error::last_os_error()));
        }
        let tester = Self {
            fd,
            frame: build_probe_frame(interface_mac(nic)),
            software,
            hardware,
            timestamps: Mutex::new(TimestampTracker {
                last_software_ns: None,
                last_hardware_ns: None,
            }),
        };

        let name = std::ffi::CString::new(nic).map_err(|_| RawSocketError::InterfaceIndex {
            name: nic.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        })?;
        // SAFETY: name is a valid NUL-terminated string.
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(RawSocketError::InterfaceIndex {
                name: nic.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }

        // SAFETY: sockaddr_ll is plain bytes.
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = ETH_P_ECAT.to_be();
        addr.sll_ifindex = ifindex as libc::c_int;
        // SAFETY: addr is fully initialized and outlives the call.
        let rc = unsafe {
            libc::bind(
                tester.fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(RawSocketError::Bind {
                name: nic.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }

        tester.enable_timestamping();
        Ok(tester)
    }

    /// Ask for RX software and raw hardware timestamps. Hardware support
    /// varies by NIC and driver; absence is not fatal, the HW column just
    /// stays empty.
    fn enable_timestamping(&self) {
        let flags: libc::c_uint = libc::SOF_TIMESTAMPING_RX_SOFTWARE
            | libc::SOF_TIMESTAMPING_RX_HARDWARE
            | libc::SOF_TIMESTAMPING_SOFTWARE
            | libc::SOF_TIMESTAMPING_RAW_HARDWARE;
        // SAFETY: flags is a valid int option value for SO_TIMESTAMPING.
        let rc = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_TIMESTAMPING,
                &flags as *const libc::c_uint as *const libc::c_void,
                std::mem::size_of::<libc::c_uint>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            warn!(
                error = %std::io::Error::last_os_error(),
                "SO_TIMESTAMPING unavailable; HW/SW delta streams stay empty"
            );
        }
    }

    fn record_timestamps(&self, software_ns: Option<u64>, hardware_ns: Option<u64>) {
        let mut tracker = self.timestamps.lock();
        if let Some(now) = software_ns {
            if let Some(previous) = tracker.last_software_ns {
                self.software.record(now.saturating_sub(previous));
            }
            tracker.last_software_ns = Some(now);
        }
        if let Some(now) = hardware_ns {
            if let Some(previous) = tracker.last_hardware_ns {
                self.hardware.record(now.saturating_sub(previous));
            }
            tracker.last_hardware_ns = Some(now);
        }
    }
}

impl NicTester for RawSocketTester {
    fn send(&self) -> Result<()> {
        // SAFETY: frame buffer is valid for its length.
        let sent = unsafe {
            libc::send(
                self.fd,
                self.frame.as_ptr() as *const libc::c_void,
                self.frame.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(RawSocketError::Send(std::io::Error::last_os_error()).into());
        }
        Ok(())
    }

    fn receive(&self) -> Result<bool> {
        let mut payload = [0u8; 2048];
        // Control buffer sized for scm_timestamping plus slack; u64-aligned.
        let mut control = [0u64; 64];

        let mut iov = libc::iovec {
            iov_base: payload.as_mut_ptr() as *mut libc::c_void,
            iov_len: payload.len(),
        };
        // SAFETY: msghdr is plain bytes; pointers stay valid for the call.
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = std::mem::size_of_val(&control);

        let received = loop {
            // SAFETY: msg points at valid buffers described above.
            let rc = unsafe { libc::recvmsg(self.fd, &mut msg, 0) };
            if rc >= 0 {
                break rc;
            }
            let error = std::io::Error::last_os_error();
            if error.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(RawSocketError::Receive(error).into());
        };
        if received == 0 {
            // A zero-length read on a packet socket means the ring is gone.
            return Ok(false);
        }

        let (software_ns, hardware_ns) = parse_rx_timestamps(&msg);
        self.record_timestamps(software_ns, hardware_ns);
        Ok(true)
    }
}

impl Drop for RawSocketTester {
    fn drop(&mut self) {
        // SAFETY: fd was returned by socket() and is owned by self.
        unsafe { libc::close(self.fd) };
    }
}

/// Walk the control messages for `SCM_TIMESTAMPING`: three timespecs, of
/// which index 0 is the software stamp and index 2 the raw hardware stamp.
/// A zeroed slot means that clock did not stamp this frame.
fn parse_rx_timestamps(msg: &libc::msghdr) -> (Option<u64>, Option<u64>) {
    let mut software_ns = None;
    let mut hardware_ns = None;

    // SAFETY: CMSG_* walk the control buffer attached to msg, which is
    // valid and of length msg_controllen.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET
                && (*cmsg).cmsg_type == libc::SCM_TIMESTAMPING
            {
                let stamps = libc::CMSG_DATA(cmsg) as *const [libc::timespec; 3];
                let stamps = &*stamps;
                let to_ns = |ts: &libc::timespec| {
                    if ts.tv_sec == 0 && ts.tv_nsec == 0 {
                        None
                    } else {
                        Some(timespec_to_ns(ts))
                    }
                };
                software_ns = to_ns(&stamps[0]);
                hardware_ns = to_ns(&stamps[2]);
            }
            cmsg = libc::CMSG_NXTHDR(msg, cmsg);
        }
    }

    (software_ns, hardware_ns)
}

/// Source MAC for the probe frame, zeroed when unreadable (broadcast
/// delivery does not depend on it).
fn interface_mac(nic: &str) -> [u8; 6] {
    let mut mac = [0u8; 6];
    if let Ok(raw) = std::fs::read_to_string(format!("/sys/class/net/{nic}/address")) {
        for (slot, octet) in mac.iter_mut().zip(raw.trim().split(':')) {
            *slot = u8::from_str_radix(octet, 16).unwrap_or(0);
        }
    }
    mac
}

/// A minimal EtherCAT frame: broadcast read of 4 bytes at register 0.
/// Any slave on the segment answers it; on a looped-back cable the frame
/// returns unchanged. Padded to the minimum wire size.
fn build_probe_frame(source_mac: [u8; 6]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MIN_FRAME_LEN);

    // Ethernet header: broadcast destination, our source, EtherCAT type.
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&source_mac);
    frame.extend_from_slice(&ETH_P_ECAT.to_be_bytes());

    // EtherCAT frame header: 11-bit length of the datagram section,
    // type 1 (EtherCAT commands).
    let datagram_len: u16 = 10 + 4 + 2; // header + data + working counter
    frame.extend_from_slice(&(datagram_len | 0x1000).to_le_bytes());

    // Datagram header: BRD (broadcast read), index 0x80, position 0,
    // offset 0, 4 data bytes, no follow-up, irq 0.
    frame.push(0x07);
    frame.push(0x80);
    frame.extend_from_slice(&0u16.to_le_bytes()); // auto-increment address
    frame.extend_from_slice(&0u16.to_le_bytes()); // register offset
    frame.extend_from_slice(&4u16.to_le_bytes()); // data length, no more datagrams
    frame.extend_from_slice(&0u16.to_le_bytes()); // irq
    frame.extend_from_slice(&[0u8; 4]); // data
    frame.extend_from_slice(&0u16.to_le_bytes()); // working counter

    frame.resize(MIN_FRAME_LEN, 0);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_frame_layout() {
        let frame = build_probe_frame([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(frame.len(), MIN_FRAME_LEN);
        // Broadcast destination.
        assert_eq!(&frame[0..6], &[0xff; 6]);
        // Source MAC carried verbatim.
        assert_eq!(&frame[6..12], &[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        // EtherType in network order.
        assert_eq!(&frame[12..14], &[0x88, 0xa4]);
        // EtherCAT header: length 16, type 1.
        assert_eq!(u16::from_le_bytes([frame[14], frame[15]]), 16 | 0x1000);
        // BRD command.
        assert_eq!(frame[16], 0x07);
    }

    #[test]
    fn test_interface_mac_of_missing_nic_is_zero() {
        assert_eq!(interface_mac("definitely-not-a-nic"), [0u8; 6]);
    }
}
