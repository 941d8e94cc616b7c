use chrono::Utc;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;
use strata_events::{HEADER_SIZE, InputBlock, PKT_SIZE, PacketHeader};
use strata_stage::{CancelToken, Source, StageError};
use tracing::{debug, info};

/// Fills input blocks from quabo UDP packets.
pub struct UdpCapture {
    socket: UdpSocket,
    buf: [u8; PKT_SIZE],
    received: u64,
    runts: u64,
}

impl UdpCapture {
    /// Binds `addr`; `poll` bounds how long a partly filled block waits
    /// for more packets.
    pub fn bind(addr: impl ToSocketAddrs, poll: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(poll))?;
        info!(addr = %socket.local_addr()?, "capture socket bound");
        Ok(Self {
            socket,
            buf: [0; PKT_SIZE],
            received: 0,
            runts: 0,
        })
    }

    #[cfg(test)]
    fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

impl Source for UdpCapture {
    type Out = InputBlock;

    /// Publishes once the block is full, or once the socket goes quiet
    /// with at least one packet buffered.
    fn fill(&mut self, block: &mut InputBlock, cancel: &CancelToken) -> Result<bool, StageError> {
        while !block.is_full() {
            if cancel.is_cancelled() {
                break;
            }
            let n = match self.socket.recv(&mut self.buf) {
                Ok(n) => n,
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let now = Utc::now();
            let packet = &self.buf[..n];
            let Some(header) =
                PacketHeader::parse(packet, now.timestamp(), now.timestamp_subsec_micros() as i64)
            else {
                self.runts += 1;
                debug!(len = n, runts = self.runts, "runt packet ignored");
                continue;
            };
            block.push_packet(header, &packet[HEADER_SIZE..]);
            self.received += 1;
        }
        Ok(!block.is_empty())
    }

    fn on_shutdown(&mut self) {
        info!(received = self.received, runts = self.runts, "capture stopped");
    }
}
