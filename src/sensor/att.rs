//! Raw L2CAP ATT socket backend.
//!
//! This backend opens an LE L2CAP socket on the fixed ATT channel and issues a
//! single ATT Read Request for the characteristic value handle, without going
//! through the BlueZ daemon. It requires CAP_NET_RAW or root privileges on
//! most systems.

use super::{RawPayload, ReadError};
use crate::config::{AddressType, DeviceConfig};
use crate::mac_address::MacAddress;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_SEQPACKET, c_int, c_void, sockaddr, socklen_t};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

// L2CAP protocol constants
const BTPROTO_L2CAP: c_int = 0;
const ATT_CID: u16 = 0x0004;

// Address types (bdaddr_type)
const BDADDR_LE_PUBLIC: u8 = 0x01;
const BDADDR_LE_RANDOM: u8 = 0x02;

// ATT opcodes
const ATT_OP_ERROR_RSP: u8 = 0x01;
const ATT_OP_READ_REQ: u8 = 0x0A;
const ATT_OP_READ_RSP: u8 = 0x0B;

/// Largest ATT PDU: 512 byte attribute value plus opcode and headroom.
const ATT_MAX_PDU: usize = 517;

/// L2CAP socket address structure
#[repr(C)]
struct SockaddrL2 {
    l2_family: libc::sa_family_t,
    l2_psm: u16,
    l2_bdaddr: [u8; 6],
    l2_cid: u16,
    l2_bdaddr_type: u8,
}

impl SockaddrL2 {
    fn att(bdaddr: [u8; 6], bdaddr_type: u8) -> Self {
        Self {
            l2_family: AF_BLUETOOTH as libc::sa_family_t,
            l2_psm: 0,
            l2_bdaddr: bdaddr,
            l2_cid: ATT_CID.to_le(),
            l2_bdaddr_type: bdaddr_type,
        }
    }

    /// Local end: any adapter, public address.
    fn local() -> Self {
        Self::att([0; 6], BDADDR_LE_PUBLIC)
    }

    fn remote(address: MacAddress, address_type: AddressType) -> Self {
        let bdaddr_type = match address_type {
            AddressType::Public => BDADDR_LE_PUBLIC,
            AddressType::Random => BDADDR_LE_RANDOM,
        };
        Self::att(address.to_le_bytes(), bdaddr_type)
    }
}

fn os_error(context: &str) -> ReadError {
    ReadError::Bluetooth(format!("{context}: {}", io::Error::last_os_error()))
}

/// Build an ATT Read Request PDU.
fn read_request(handle: u16) -> [u8; 3] {
    let [lo, hi] = handle.to_le_bytes();
    [ATT_OP_READ_REQ, lo, hi]
}

/// Interpret a PDU received after a Read Request.
///
/// Returns `None` for PDUs unrelated to the pending read (notifications,
/// server-initiated requests), which the caller skips.
fn parse_response(pdu: &[u8], handle: u16) -> Option<Result<RawPayload, ReadError>> {
    match pdu {
        [ATT_OP_READ_RSP, value @ ..] => Some(Ok(value.to_vec())),
        [ATT_OP_ERROR_RSP, ATT_OP_READ_REQ, lo, hi, code, ..] => Some(Err(ReadError::Att {
            handle: u16::from_le_bytes([*lo, *hi]),
            code: *code,
        })),
        [ATT_OP_ERROR_RSP, ..] => Some(Err(ReadError::Att { handle, code: 0 })),
        _ => None,
    }
}

fn timeval(timeout: Duration) -> libc::timeval {
    libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    }
}

/// Open an L2CAP sequential-packet socket
fn open_l2cap_socket() -> Result<OwnedFd, ReadError> {
    let fd = unsafe { libc::socket(AF_BLUETOOTH, SOCK_SEQPACKET | SOCK_CLOEXEC, BTPROTO_L2CAP) };

    if fd < 0 {
        return Err(os_error("Failed to create L2CAP socket"));
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bound blocking connect, send and receive by `timeout`
fn set_timeouts(fd: &OwnedFd, timeout: Duration) -> Result<(), ReadError> {
    let tv = timeval(timeout);
    for option in [libc::SO_RCVTIMEO, libc::SO_SNDTIMEO] {
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                option,
                &tv as *const libc::timeval as *const c_void,
                mem::size_of::<libc::timeval>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to set socket timeout"));
        }
    }
    Ok(())
}

fn bind_l2cap_socket(fd: &OwnedFd, addr: &SockaddrL2) -> Result<(), ReadError> {
    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            addr as *const SockaddrL2 as *const sockaddr,
            mem::size_of::<SockaddrL2>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(os_error("Failed to bind L2CAP socket"));
    }

    Ok(())
}

fn connect_l2cap_socket(fd: &OwnedFd, addr: &SockaddrL2) -> Result<(), ReadError> {
    let ret = unsafe {
        libc::connect(
            fd.as_raw_fd(),
            addr as *const SockaddrL2 as *const sockaddr,
            mem::size_of::<SockaddrL2>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(os_error("Failed to connect"));
    }

    Ok(())
}

fn send_pdu(fd: &OwnedFd, pdu: &[u8]) -> Result<(), ReadError> {
    let ret = unsafe { libc::write(fd.as_raw_fd(), pdu.as_ptr() as *const c_void, pdu.len()) };

    if ret < 0 {
        return Err(os_error("Failed to send ATT request"));
    }

    Ok(())
}

fn recv_pdu(fd: &OwnedFd, buf: &mut [u8]) -> Result<usize, ReadError> {
    let ret = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len()) };

    if ret < 0 {
        return Err(os_error("Failed to receive ATT response"));
    }
    if ret == 0 {
        return Err(ReadError::Bluetooth("Connection closed by device".into()));
    }

    Ok(ret as usize)
}

fn read_blocking(
    device: DeviceConfig,
    handle: u16,
    timeout: Duration,
) -> Result<RawPayload, ReadError> {
    let fd = open_l2cap_socket()?;
    set_timeouts(&fd, timeout)?;
    bind_l2cap_socket(&fd, &SockaddrL2::local())?;
    connect_l2cap_socket(&fd, &SockaddrL2::remote(device.address, device.address_type))?;
    tracing::debug!(address = %device.address, "connected");

    send_pdu(&fd, &read_request(handle))?;

    let mut buf = [0u8; ATT_MAX_PDU];
    loop {
        let n = recv_pdu(&fd, &mut buf)?;
        match parse_response(&buf[..n], handle) {
            Some(result) => return result,
            None => tracing::debug!(opcode = buf[0], "skipping unrelated ATT PDU"),
        }
    }
}

/// Read the attribute at `handle` over a fresh ATT connection.
///
/// The socket is blocking and is driven on tokio's blocking pool; closing it
/// (dropping the fd) tears down the LE link.
pub async fn read_characteristic(
    device: DeviceConfig,
    handle: u16,
    timeout: Duration,
) -> Result<RawPayload, ReadError> {
    tokio::task::spawn_blocking(move || read_blocking(device, handle, timeout))
        .await
        .map_err(|e| ReadError::Bluetooth(format!("ATT read task failed: {e}")))?
}
