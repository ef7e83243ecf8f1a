//! PFCP Path
//!
//! Socket bring-up and the datagram send seam used by the transaction
//! manager and the listener.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Non-blocking datagram transmit
pub trait PfcpSend {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

impl PfcpSend for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.try_send_to(buf, addr)
    }
}

/// Send one datagram, treating a short write as a failure
pub fn send_datagram(tx: &dyn PfcpSend, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
    let sent = tx.send_to(buf, addr)?;
    if sent != buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short send {sent}/{}", buf.len()),
        ));
    }
    Ok(())
}

/// Bind a PFCP server socket
pub async fn pfcp_server(addr: SocketAddr) -> io::Result<UdpSocket> {
    let sock = UdpSocket::bind(addr).await?;
    log::info!("pfcp_server() [{}]:{}", addr.ip(), addr.port());
    Ok(sock)
}

/// Recording transmitter for tests, also exported under the `test-util`
/// feature
#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};

    use bytes::Bytes;

    use crate::header::PfcpHeader;

    /// Records every datagram; can be switched to fail
    #[derive(Default)]
    pub struct MockSend {
        pub sent: RefCell<Vec<(Bytes, SocketAddr)>>,
        pub fail: Cell<bool>,
    }

    impl PfcpSend for MockSend {
        fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
            if self.fail.get() {
                return Err(io::Error::new(io::ErrorKind::Other, "send failed"));
            }
            self.sent
                .borrow_mut()
                .push((Bytes::copy_from_slice(buf), addr));
            Ok(buf.len())
        }
    }

    impl MockSend {
        pub fn count(&self) -> usize {
            self.sent.borrow().len()
        }

        /// Header and body of the last datagram
        pub fn last(&self) -> Option<(PfcpHeader, Bytes)> {
            let sent = self.sent.borrow();
            let (buf, _) = sent.last()?;
            let mut body = buf.clone();
            let h = PfcpHeader::decode(&mut body).ok()?;
            Some((h, body))
        }
    }
}
