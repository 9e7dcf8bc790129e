//! Scripted in-memory transport for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::core::Transport;

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub open: bool,
    pub binds: u32,
    pub closes: u32,
    pub bound_port: Option<u16>,
    pub fail_binds: u32,
    pub fail_sends: u32,
    pub fail_recvs: u32,
    pub inbox: VecDeque<(Vec<u8>, SocketAddr)>,
    pub sent: Vec<(SocketAddr, Vec<u8>)>,
}

impl MockState {
    pub fn push_datagram(&mut self, bytes: &[u8]) {
        self.inbox.push_back((bytes.to_vec(), peer()));
    }
}

pub(crate) fn peer() -> SocketAddr {
    "127.0.0.1:2001".parse().unwrap()
}

#[derive(Debug)]
pub(crate) struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new() -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }

    /// A transport that is already open, as if it survived a restart.
    pub fn open() -> (Self, Rc<RefCell<MockState>>) {
        let (transport, state) = Self::new();
        state.borrow_mut().open = true;
        (transport, state)
    }
}

impl Transport for MockTransport {
    fn bind(&mut self, port: u16) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.binds += 1;
        if state.fail_binds > 0 {
            state.fail_binds -= 1;
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"));
        }
        state.open = true;
        state.bound_port = Some(port);
        Ok(())
    }

    fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(io::Error::new(io::ErrorKind::NetworkUnreachable, "unreachable"));
        }
        state.sent.push((addr, bytes.to_vec()));
        Ok(bytes.len())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let mut state = self.state.borrow_mut();
        if state.fail_recvs > 0 {
            state.fail_recvs -= 1;
            return Err(io::Error::other("receive fault"));
        }
        match state.inbox.pop_front() {
            Some((bytes, from)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(Some((len, from)))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.open {
            state.open = false;
            state.closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.state.borrow().open
    }
}
