//! Secure stream transport used by the tunnel
//!
//! The GPST core never touches sockets or TLS records directly. It drives an already
//! established secure byte stream through [`Transport`] and obtains fresh streams from
//! a [`Connector`] for the initial connection and every reconnect.

use std::io;

/// An established secure byte stream
///
/// The blocking calls are used while negotiating the tunnel. Once the tunnel is up,
/// only the non-blocking calls are used, from a single control flow.
pub trait Transport {
    /// Blocking read. `Ok(0)` means the peer closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Blocking write of the whole buffer
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Non-blocking read of one frame's worth of bytes. `Ok(0)` means nothing is
    /// available right now.
    fn read_nonblock(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Non-blocking write. `Ok(0)` means the stream is not writable right now and
    /// nothing was consumed; the same bytes must be offered again later.
    fn write_nonblock(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Push out bytes an earlier non-blocking write left buffered inside the
    /// transport. `Ok(true)` means some are still waiting for the stream to become
    /// writable.
    fn flush_nonblock(&mut self) -> io::Result<bool> {
        Ok(false)
    }

    /// Tear the stream down. Further calls fail.
    fn close(&mut self);
}

/// Opens new secure streams to the gateway
pub trait Connector {
    type Transport: Transport;

    /// Establish a fresh secure stream
    fn connect(&mut self) -> io::Result<Self::Transport>;
}

/// Readiness the host should poll the transport for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
    pub except: bool,
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory transport for tests

    use super::{Connector, Transport};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    /// Outcome of one non-blocking write attempt
    #[derive(Debug, Clone, Copy)]
    pub enum WriteStep {
        Accept,
        Block,
        Partial(usize),
        /// Accept, but report buffered bytes on the next `n` flushes
        Buffered(usize),
        Fail(io::ErrorKind),
    }

    /// One recorded non-blocking write attempt
    #[derive(Debug, Clone)]
    pub struct WriteAttempt {
        pub ptr: *const u8,
        pub data: Vec<u8>,
    }

    #[derive(Default)]
    pub struct MockState {
        /// Results for blocking reads; empty means peer closed
        pub blocking_reads: VecDeque<io::Result<Vec<u8>>>,
        /// Results for non-blocking reads; empty means nothing available
        pub reads: VecDeque<io::Result<Vec<u8>>>,
        /// Results for non-blocking writes; empty means accept
        pub writes: VecDeque<WriteStep>,
        pub blocking_write_error: Option<io::ErrorKind>,
        /// Everything sent with `write_all`
        pub requests: Vec<Vec<u8>>,
        pub attempts: Vec<WriteAttempt>,
        /// Bytes the peer actually received through non-blocking writes
        pub delivered: Vec<Vec<u8>>,
        /// Flushes left that still report buffered bytes
        pub unflushed: usize,
        pub closed: bool,
    }

    /// Cheaply clonable handle; clones share the same script and recordings
    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub state: Rc<RefCell<MockState>>,
    }

    impl MockTransport {
        /// A transport whose gateway answers the GET-tunnel request with `response`
        pub fn answering(response: &[u8]) -> Self {
            let transport = Self::default();
            transport
                .state
                .borrow_mut()
                .blocking_reads
                .push_back(Ok(response.to_vec()));
            transport
        }

        pub fn push_read(&self, data: Vec<u8>) {
            self.state.borrow_mut().reads.push_back(Ok(data));
        }

        pub fn push_read_error(&self, kind: io::ErrorKind) {
            self.state.borrow_mut().reads.push_back(Err(kind.into()));
        }

        pub fn push_write(&self, step: WriteStep) {
            self.state.borrow_mut().writes.push_back(step);
        }

        pub fn delivered(&self) -> Vec<Vec<u8>> {
            self.state.borrow().delivered.clone()
        }

        pub fn attempts(&self) -> Vec<WriteAttempt> {
            self.state.borrow().attempts.clone()
        }

        pub fn requests(&self) -> Vec<Vec<u8>> {
            self.state.borrow().requests.clone()
        }

        pub fn is_closed(&self) -> bool {
            self.state.borrow().closed
        }
    }

    impl Transport for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let next = self.state.borrow_mut().blocking_reads.pop_front();
            match next {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            let mut state = self.state.borrow_mut();
            if let Some(kind) = state.blocking_write_error {
                return Err(kind.into());
            }
            state.requests.push(data.to_vec());
            Ok(())
        }

        fn read_nonblock(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let next = self.state.borrow_mut().reads.pop_front();
            match next {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn write_nonblock(&mut self, data: &[u8]) -> io::Result<usize> {
            let mut state = self.state.borrow_mut();
            state.attempts.push(WriteAttempt {
                ptr: data.as_ptr(),
                data: data.to_vec(),
            });
            match state.writes.pop_front().unwrap_or(WriteStep::Accept) {
                WriteStep::Accept => {
                    state.delivered.push(data.to_vec());
                    Ok(data.len())
                }
                WriteStep::Block => Ok(0),
                WriteStep::Buffered(flushes) => {
                    state.delivered.push(data.to_vec());
                    state.unflushed = flushes;
                    Ok(data.len())
                }
                WriteStep::Partial(n) => {
                    state.delivered.push(data[..n].to_vec());
                    Ok(n)
                }
                WriteStep::Fail(kind) => Err(kind.into()),
            }
        }

        fn flush_nonblock(&mut self) -> io::Result<bool> {
            let mut state = self.state.borrow_mut();
            if state.unflushed == 0 {
                return Ok(false);
            }
            state.unflushed -= 1;
            Ok(true)
        }

        fn close(&mut self) {
            self.state.borrow_mut().closed = true;
        }
    }

    /// Hands out pre-built transports in order
    #[derive(Default)]
    pub struct MockConnector {
        pub transports: VecDeque<io::Result<MockTransport>>,
        pub connects: usize,
    }

    impl MockConnector {
        pub fn with(transports: Vec<MockTransport>) -> Self {
            Self {
                transports: transports.into_iter().map(Ok).collect(),
                connects: 0,
            }
        }

        pub fn push_failure(&mut self, kind: io::ErrorKind) {
            self.transports.push_back(Err(kind.into()));
        }
    }

    impl Connector for MockConnector {
        type Transport = MockTransport;

        fn connect(&mut self) -> io::Result<MockTransport> {
            self.connects += 1;
            self.transports
                .pop_front()
                .unwrap_or_else(|| Err(io::ErrorKind::ConnectionRefused.into()))
        }
    }
}
