//! In-process fan-out to simulated peripherals sharing a bus channel with
//! the master.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// A participant on the virtual bus: a simulated peripheral, or any other
/// stand-in that wants to see (and possibly answer) every request sent on
/// the bus this master drives.
pub trait BusMember: Send {
    /// Returns `Some(data)` to answer `request`, `None` to stay silent.
    fn on_request(&mut self, request: u16) -> Option<Vec<u8>>;

    /// Called unconditionally once a request (real or simulated) completes.
    fn on_request_complete(&mut self, request: u16, data: &[u8]);

    /// Called when the transport failed to complete `request`. Most
    /// members have nothing to do here.
    fn on_error(&mut self, _request: u16, _err: &Error) {}
}

/// Fans a request out to every attached member, in attachment order.
///
/// At most one member may answer a given request — if more than one
/// returns data, [`Error::BusContention`] is raised.
#[derive(Default)]
pub struct VirtualBus {
    members: Vec<Arc<Mutex<dyn BusMember>>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, member: Arc<Mutex<dyn BusMember>>) {
        self.members.push(member);
    }

    pub fn on_request(&self, request: u16) -> Result<Option<Vec<u8>>> {
        let mut response = None;
        for member in &self.members {
            let r = member.lock().unwrap().on_request(request);
            if r.is_some() {
                if response.is_some() {
                    return Err(Error::BusContention(request as u32));
                }
                response = r;
            }
        }
        Ok(response)
    }

    pub fn on_request_complete(&self, request: u16, data: &[u8]) {
        for member in &self.members {
            member.lock().unwrap().on_request_complete(request, data);
        }
    }

    pub fn on_error(&self, request: u16, err: &Error) {
        for member in &self.members {
            member.lock().unwrap().on_error(request, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(Vec<u8>);
    impl BusMember for Always {
        fn on_request(&mut self, _request: u16) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
        fn on_request_complete(&mut self, _request: u16, _data: &[u8]) {}
    }

    struct Silent;
    impl BusMember for Silent {
        fn on_request(&mut self, _request: u16) -> Option<Vec<u8>> {
            None
        }
        fn on_request_complete(&mut self, _request: u16, _data: &[u8]) {}
    }

    // Scenario 5: two members both responding raises BusContention.
    #[test]
    fn two_responders_raise_bus_contention() {
        let mut bus = VirtualBus::new();
        bus.add(Arc::new(Mutex::new(Always(vec![1]))));
        bus.add(Arc::new(Mutex::new(Always(vec![2]))));
        assert!(matches!(bus.on_request(0x1000), Err(Error::BusContention(_))));
    }

    #[test]
    fn single_responder_wins_alongside_silent_members() {
        let mut bus = VirtualBus::new();
        bus.add(Arc::new(Mutex::new(Silent)));
        bus.add(Arc::new(Mutex::new(Always(vec![7]))));
        assert_eq!(bus.on_request(0x1000).unwrap(), Some(vec![7]));
    }

    #[test]
    fn completion_fans_out_even_without_contention() {
        struct Counter(u32);
        impl BusMember for Counter {
            fn on_request(&mut self, _request: u16) -> Option<Vec<u8>> {
                None
            }
            fn on_request_complete(&mut self, _request: u16, _data: &[u8]) {
                self.0 += 1;
            }
        }
        let counter = Arc::new(Mutex::new(Counter(0)));
        let mut bus = VirtualBus::new();
        bus.add(counter.clone());
        bus.on_request_complete(0x1000, &[]);
        assert_eq!(counter.lock().unwrap().0, 1);
    }
}
