//! The byte-stream framing layer: issuing master requests/sends and, in
//! sniffer mode, tracking arbitrary traffic on the wire.

use std::time::{Duration, Instant};

use crate::codec::{create_frame, create_header, data_checksum, request_code};
use crate::constants::{PARITY_MASK, SYNC, T_DAT, T_ECHO, T_REQ};
use crate::error::{Error, Result};

/// The serial-port abstraction boundary: anything that can write bytes out
/// and read a single byte back within a bounded wait. Implemented for a
/// boxed `serialport::SerialPort` in [`crate::bin`] binaries, and by an
/// in-memory fake in tests.
pub trait ByteStream: Send {
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Reads one byte, waiting up to `timeout`. `Ok(None)` means the
    /// deadline passed with nothing arriving; it is not an error.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>>;
}

impl ByteStream for Box<dyn serialport::SerialPort> {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self.as_mut(), buf)?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        self.set_timeout(timeout)?;
        let mut byte = [0u8; 1];
        match std::io::Read::read(self.as_mut(), &mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }
}

/// Lets the master own a `LineTransport<Box<dyn ByteStream>>`, boxing
/// whichever concrete stream (serial port, or an in-memory fake in tests)
/// it was built with.
impl<T: ByteStream + ?Sized> ByteStream for Box<T> {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_all(buf)
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        (**self).read_byte(timeout)
    }
}

/// Observer of raw bus events: successfully framed traffic, or a failure
/// while trying to frame it.
pub trait TrafficListener: Send {
    fn on_traffic(&mut self, timestamp: Instant, request: u16, data: &[u8], checksum: u8);
    fn on_error(&mut self, timestamp: Instant, request: u16, err: &Error);
}

/// Drives a [`ByteStream`] as bus master: issuing request/response
/// exchanges and one-shot sends, with one-wire echo suppression.
pub struct LineTransport<S: ByteStream> {
    stream: S,
    one_wire: bool,
    traffic_listeners: Vec<Box<dyn TrafficListener>>,
}

impl<S: ByteStream> LineTransport<S> {
    pub fn new(stream: S, one_wire: bool) -> Self {
        Self { stream, one_wire, traffic_listeners: Vec::new() }
    }

    pub fn add_traffic_listener(&mut self, listener: Box<dyn TrafficListener>) {
        self.traffic_listeners.push(listener);
    }

    fn notify_traffic(&mut self, timestamp: Instant, request: u16, data: &[u8], checksum: u8) {
        for listener in &mut self.traffic_listeners {
            listener.on_traffic(timestamp, request, data, checksum);
        }
    }

    fn notify_error(&mut self, timestamp: Instant, request: u16, err: &Error) {
        for listener in &mut self.traffic_listeners {
            listener.on_error(timestamp, request, err);
        }
    }

    fn drain_echo(&mut self, len: usize) -> Result<()> {
        let start = Instant::now();
        let mut got = 0usize;
        while got < len {
            let elapsed = start.elapsed();
            if elapsed >= T_ECHO {
                return Err(Error::SelfEchoTimeout);
            }
            if self.stream.read_byte(T_ECHO - elapsed)?.is_some() {
                got += 1;
            }
        }
        Ok(())
    }

    /// Writes a request header, then waits for `[size, data.., checksum]`.
    pub fn request_data(&mut self, request: u16) -> Result<Vec<u8>> {
        let header = create_header(request)?;
        self.stream.write_all(&header)?;
        if self.one_wire {
            self.drain_echo(header.len())?;
        }

        let start = Instant::now();
        let mut size = None;
        while start.elapsed() < T_REQ {
            if let Some(b) = self.stream.read_byte(T_REQ - start.elapsed())? {
                size = Some(b);
                break;
            }
        }
        let size = match size {
            Some(s) => s,
            None => {
                self.notify_error(Instant::now(), request, &Error::Timeout);
                return Err(Error::Timeout);
            }
        };

        let mut data = Vec::with_capacity(size as usize);
        let data_start = Instant::now();
        while data.len() < size as usize && data_start.elapsed() < T_DAT {
            if let Some(b) = self.stream.read_byte(T_DAT - data_start.elapsed())? {
                data.push(b);
            }
        }
        if data.len() != size as usize {
            let err = Error::IncompleteResponse { got: data.len(), want: size as usize };
            self.notify_error(Instant::now(), request, &err);
            return Err(err);
        }

        let mut checksum = None;
        let cs_start = Instant::now();
        while checksum.is_none() && cs_start.elapsed() < T_DAT {
            if let Some(b) = self.stream.read_byte(T_DAT - cs_start.elapsed())? {
                checksum = Some(b);
            }
        }
        let checksum = match checksum {
            Some(c) => c,
            None => {
                self.notify_error(Instant::now(), request, &Error::Timeout);
                return Err(Error::Timeout);
            }
        };

        let want = data_checksum(&data);
        if checksum != want {
            let err = Error::ChecksumError { got: checksum, want };
            self.notify_error(Instant::now(), request, &err);
            return Err(err);
        }

        self.notify_traffic(Instant::now(), request, &data, checksum);
        Ok(data)
    }

    /// Writes a full frame and, on one-wire links, drains its own echo.
    pub fn send_data(&mut self, request: u16, data: &[u8], checksum: Option<u8>) -> Result<()> {
        let frame = create_frame(request, data, checksum)?;
        self.stream.write_all(&frame)?;
        if self.one_wire {
            self.drain_echo(frame.len())?;
        }
        self.notify_traffic(Instant::now(), request, data, checksum.unwrap_or_else(|| data_checksum(data)));
        Ok(())
    }

    /// Writes a bare `[size, data.., checksum]` response, with no header —
    /// used when a virtual bus member answered a request and that answer
    /// also needs to be mirrored onto a real wire this transport drives.
    pub fn write_response(&mut self, data: &[u8], checksum: Option<u8>) -> Result<()> {
        let checksum = checksum.unwrap_or_else(|| data_checksum(data));
        let mut out = Vec::with_capacity(data.len() + 2);
        out.push(data.len() as u8);
        out.extend_from_slice(data);
        out.push(checksum);
        self.stream.write_all(&out)?;
        Ok(())
    }

    /// Sniffs the wire for any traffic, acting as a transparent observer.
    /// If `responder` returns a response for a seen request, that response
    /// is written back onto the wire, acting as a simulated bus member.
    ///
    /// Runs until `running` is cleared or the stream returns a hard IO
    /// error; timeouts and malformed headers are recoverable and just reset
    /// the state machine.
    pub fn listen(
        &mut self,
        running: &std::sync::atomic::AtomicBool,
        mut responder: impl FnMut(u16) -> Option<Vec<u8>>,
    ) -> Result<()> {
        use std::sync::atomic::Ordering;

        let mut state = SnifferState::WaitSync;
        let mut req_word = 0u16;
        let mut size = 0u8;
        let mut data: Vec<u8> = Vec::new();
        let mut last_byte = Instant::now();

        while running.load(Ordering::Relaxed) {
            let byte = match self.stream.read_byte(Duration::from_millis(100))? {
                Some(b) => b,
                None => {
                    if state != SnifferState::WaitSync && last_byte.elapsed() > T_DAT {
                        self.notify_error(Instant::now(), req_word & PARITY_MASK, &Error::Timeout);
                        state = SnifferState::WaitSync;
                    }
                    continue;
                }
            };
            last_byte = Instant::now();

            match state {
                SnifferState::WaitSync => {
                    if byte == SYNC {
                        state = SnifferState::WaitReqMsb;
                    }
                }
                SnifferState::WaitReqMsb => {
                    req_word = (byte as u16) << 8;
                    state = SnifferState::WaitReqLsb;
                }
                SnifferState::WaitReqLsb => {
                    req_word |= byte as u16;
                    let id = req_word & PARITY_MASK;
                    if request_code(id)? != req_word {
                        self.notify_error(Instant::now(), id, &Error::HeaderError(req_word));
                        state = SnifferState::WaitSync;
                        continue;
                    }
                    if let Some(response) = responder(id) {
                        let checksum = data_checksum(&response);
                        let mut out = vec![response.len() as u8];
                        out.extend_from_slice(&response);
                        out.push(checksum);
                        self.stream.write_all(&out)?;
                        self.notify_traffic(Instant::now(), id, &response, checksum);
                        if self.one_wire {
                            data.clear();
                            size = response.len() as u8;
                            state = SnifferState::WaitSize;
                        } else {
                            state = SnifferState::WaitSync;
                        }
                    } else {
                        data.clear();
                        state = SnifferState::WaitSize;
                    }
                }
                SnifferState::WaitSize => {
                    size = byte;
                    state = if size == 0 { SnifferState::WaitChecksum } else { SnifferState::WaitData };
                }
                SnifferState::WaitData => {
                    data.push(byte);
                    if data.len() >= size as usize {
                        state = SnifferState::WaitChecksum;
                    }
                }
                SnifferState::WaitChecksum => {
                    let id = req_word & PARITY_MASK;
                    let want = data_checksum(&data);
                    if byte != want {
                        self.notify_error(Instant::now(), id, &Error::ChecksumError { got: byte, want });
                    } else {
                        self.notify_traffic(Instant::now(), id, &data, byte);
                    }
                    state = SnifferState::WaitSync;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnifferState {
    WaitSync,
    WaitReqMsb,
    WaitReqLsb,
    WaitSize,
    WaitData,
    WaitChecksum,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct MemoryStream {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl MemoryStream {
        fn new(inbound: &[u8]) -> Self {
            Self { inbound: inbound.iter().copied().collect(), outbound: Vec::new() }
        }
    }

    impl ByteStream for MemoryStream {
        fn write_all(&mut self, buf: &[u8]) -> Result<()> {
            self.outbound.extend_from_slice(buf);
            Ok(())
        }

        fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>> {
            Ok(self.inbound.pop_front())
        }
    }

    /// Records traffic/errors and stops the sniffer loop after the first
    /// event, so `listen` on a finite in-memory stream terminates.
    struct RecordingListener {
        running: Arc<AtomicBool>,
        traffic: Arc<std::sync::Mutex<Vec<(u16, Vec<u8>, u8)>>>,
        errors: Arc<std::sync::Mutex<Vec<u16>>>,
    }

    impl TrafficListener for RecordingListener {
        fn on_traffic(&mut self, _timestamp: Instant, request: u16, data: &[u8], checksum: u8) {
            self.traffic.lock().unwrap().push((request, data.to_vec(), checksum));
            self.running.store(false, Ordering::Relaxed);
        }

        fn on_error(&mut self, _timestamp: Instant, request: u16, _err: &Error) {
            self.errors.lock().unwrap().push(request);
            self.running.store(false, Ordering::Relaxed);
        }
    }

    #[test]
    fn request_data_round_trips_on_a_clean_stream() {
        let stream = MemoryStream::new(&[0x01, 0x01, 0xA5]);
        let mut transport = LineTransport::new(stream, false);
        let data = transport.request_data(0x0200).unwrap();
        assert_eq!(data, vec![0x01]);
    }

    #[test]
    fn request_data_detects_bad_checksum() {
        let stream = MemoryStream::new(&[0x01, 0x01, 0x00]);
        let mut transport = LineTransport::new(stream, false);
        assert!(matches!(transport.request_data(0x0200), Err(Error::ChecksumError { .. })));
    }

    // Scenario D: sniffer given 55 C2 00 01 01 A5 emits one traffic record
    // request=0x0200, size=1, data=[0x01], checksum=0xA5.
    #[test]
    fn scenario_d_sniffer_decodes_a_clean_frame() {
        let stream = MemoryStream::new(&[0x55, 0xC2, 0x00, 0x01, 0x01, 0xA5]);
        let mut transport = LineTransport::new(stream, false);
        let running = Arc::new(AtomicBool::new(true));
        let traffic = Arc::new(std::sync::Mutex::new(Vec::new()));
        transport.add_traffic_listener(Box::new(RecordingListener {
            running: running.clone(),
            traffic: traffic.clone(),
            errors: Arc::new(std::sync::Mutex::new(Vec::new())),
        }));

        transport.listen(&running, |_| None).unwrap();

        let traffic = traffic.lock().unwrap();
        assert_eq!(*traffic, vec![(0x0200, vec![0x01], 0xA5)]);
    }

    #[test]
    fn scenario_d_flipped_checksum_byte_is_an_error() {
        let stream = MemoryStream::new(&[0x55, 0xC2, 0x00, 0x01, 0x01, 0x00]);
        let mut transport = LineTransport::new(stream, false);
        let running = Arc::new(AtomicBool::new(true));
        let errors = Arc::new(std::sync::Mutex::new(Vec::new()));
        transport.add_traffic_listener(Box::new(RecordingListener {
            running: running.clone(),
            traffic: Arc::new(std::sync::Mutex::new(Vec::new())),
            errors: errors.clone(),
        }));

        transport.listen(&running, |_| None).unwrap();

        assert_eq!(*errors.lock().unwrap(), vec![0x0200]);
    }
}
