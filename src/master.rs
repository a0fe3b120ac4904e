//! The master engine: a single-consumer event queue driven by a dedicated
//! worker thread, mediating between the schedule executor, user calls, the
//! transport and the virtual bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::constants::{
    REQUEST_ID_MASK, REQ_COND_CHANGE_ADDRESS, REQ_IDLE, REQ_OP_STATUS, REQ_POWER_STATUS,
    REQ_SERIAL_NUMBER, REQ_SHUTDOWN, REQ_SW_NUMBER, REQ_WAKEUP, op_status_str,
};
use crate::error::{Error, Result};
use crate::network::{Network, Request, SignalValue, SignalValueContainer};
use crate::schedule::create_executor;
use crate::transport::{ByteStream, LineTransport};
use crate::vbus::VirtualBus;

const QUEUE_CAPACITY: usize = 64;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Diagnostic property a [`NodeStatusListener`] is told changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatusProperty {
    OpStatus,
    PowerStatus,
    SerialNumber,
    SoftwareVersion,
}

/// Decoded `REQ_POWER_STATUS` response: `voltage` in volts, currents raw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerStatus {
    pub voltage: f64,
    pub op_current: u8,
    pub sleep_current: u8,
}

/// Per-address diagnostic snapshot. Every field starts absent and is filled
/// in the first time the corresponding request completes.
#[derive(Debug, Clone, Default)]
pub struct NodeStatus {
    pub op_status: Option<String>,
    pub power_status: Option<PowerStatus>,
    pub serial_number: Option<u32>,
    pub software_version: Option<String>,
}

/// Buffered state of one network `Request`, updated every time it completes
/// on the wire (successfully or not).
pub struct UserRequest {
    pub last_timestamp: Option<Instant>,
    pub signals: SignalValueContainer,
    pub exception: Option<Arc<Error>>,
}

impl UserRequest {
    fn new(request: &Request) -> Self {
        let signals = request
            .signals
            .iter()
            .map(|s| SignalValue { signal: s.clone(), phy: s.initial.clone(), raw: 0 })
            .collect();
        Self { last_timestamp: None, signals: SignalValueContainer::new(signals), exception: None }
    }
}

/// Observer of decoded request traffic for requests named in the network.
pub trait RequestListener: Send {
    fn on_request(&mut self, timestamp: Instant, request: &Arc<Request>, signals: &SignalValueContainer);
    fn on_error(&mut self, timestamp: Instant, request: u16, kind: &str);
}

/// Observer of `NodeStatus` changes.
pub trait NodeStatusListener: Send {
    fn on_node_change(&mut self, address: u8, property: NodeStatusProperty, status: &NodeStatus);
}

/// The fire-and-forget surface a schedule thread calls into. Deliberately
/// narrower than [`LineMaster`]'s own API — schedule entries never wait for
/// completion — so the scheduler never needs to own the master, breaking
/// the Master/Scheduler/VirtualBus reference cycle.
pub trait MasterHandle: Send + Sync {
    fn wakeup(&self);
    fn idle(&self);
    fn shutdown(&self);
    fn get_operation_status(&self, addr: u8);
    fn get_power_status(&self, addr: u8);
    fn get_serial_number(&self, addr: u8);
    fn get_software_version(&self, addr: u8);
    fn request_by_id(&self, id: u16);
}

#[derive(Default)]
struct Completion {
    done: bool,
    response: Option<Vec<u8>>,
    exception: Option<Arc<Error>>,
}

/// One-shot completion signal for a single submitted event: a single
/// assignment cell plus a condition variable, replacing the source's
/// `threading.Event` + mutable exception field.
struct EventHandle {
    state: Mutex<Completion>,
    condvar: Condvar,
}

impl EventHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(Completion::default()), condvar: Condvar::new() })
    }

    fn signal_response(&self, response: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.done = true;
        state.response = Some(response);
        self.condvar.notify_all();
    }

    fn signal_exception(&self, err: Arc<Error>) {
        let mut state = self.state.lock().unwrap();
        state.done = true;
        state.exception = Some(err);
        self.condvar.notify_all();
    }

    /// Blocks until signalled or `timeout` elapses. `None` waits forever —
    /// per §9's open question, callers should avoid that in practice.
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let state = self.state.lock().unwrap();
        match timeout {
            Some(t) => {
                let (_, result) = self.condvar.wait_timeout_while(state, t, |s| !s.done).unwrap();
                !result.timed_out()
            }
            None => {
                let _ = self.condvar.wait_while(state, |s| !s.done).unwrap();
                true
            }
        }
    }

    fn take_response(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().response.take()
    }

    fn take_exception(&self) -> Option<Arc<Error>> {
        self.state.lock().unwrap().exception.take()
    }
}

enum Payload {
    Rx,
    Tx { data: Vec<u8>, checksum: Option<u8> },
}

struct WorkItem {
    request: u16,
    payload: Payload,
    handle: Option<Arc<EventHandle>>,
}

struct LineMasterHandle {
    sender: SyncSender<WorkItem>,
}

impl LineMasterHandle {
    fn send(&self, request: u16, payload: Payload) {
        if self.sender.try_send(WorkItem { request, payload, handle: None }).is_err() {
            log::warn!("schedule entry for {request:#06x} dropped: queue full or master exited");
        }
    }
}

impl MasterHandle for LineMasterHandle {
    fn wakeup(&self) {
        self.send(REQ_WAKEUP, Payload::Tx { data: Vec::new(), checksum: None });
    }
    fn idle(&self) {
        self.send(REQ_IDLE, Payload::Tx { data: Vec::new(), checksum: None });
    }
    fn shutdown(&self) {
        self.send(REQ_SHUTDOWN, Payload::Tx { data: Vec::new(), checksum: None });
    }
    fn get_operation_status(&self, addr: u8) {
        self.send(REQ_OP_STATUS | addr as u16, Payload::Rx);
    }
    fn get_power_status(&self, addr: u8) {
        self.send(REQ_POWER_STATUS | addr as u16, Payload::Rx);
    }
    fn get_serial_number(&self, addr: u8) {
        self.send(REQ_SERIAL_NUMBER | addr as u16, Payload::Rx);
    }
    fn get_software_version(&self, addr: u8) {
        self.send(REQ_SW_NUMBER | addr as u16, Payload::Rx);
    }
    fn request_by_id(&self, id: u16) {
        self.send(id, Payload::Rx);
    }
}

struct ScheduleHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Bus master: owns the transport and virtual bus, runs a worker thread
/// that is the sole consumer of submitted requests, and optionally a
/// schedule thread driving periodic traffic.
pub struct LineMaster {
    network: Option<Arc<Network>>,
    virtual_bus: Arc<Mutex<VirtualBus>>,
    node_status: Arc<Mutex<HashMap<u8, NodeStatus>>>,
    user_requests: Arc<Mutex<HashMap<u16, UserRequest>>>,
    request_listeners: Arc<Mutex<Vec<Box<dyn RequestListener>>>>,
    node_status_listeners: Arc<Mutex<Vec<Box<dyn NodeStatusListener>>>>,
    transport: Option<LineTransport<Box<dyn ByteStream>>>,
    sender: Option<SyncSender<WorkItem>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    schedule: Option<ScheduleHandle>,
    baudrate: u32,
}

impl LineMaster {
    /// Builds a master with no network loaded. `transport` is `None` for a
    /// master driving only a virtual bus (no real wire attached).
    pub fn new(transport: Option<LineTransport<Box<dyn ByteStream>>>, baudrate: u32) -> Self {
        Self {
            network: None,
            virtual_bus: Arc::new(Mutex::new(VirtualBus::new())),
            node_status: Arc::new(Mutex::new(HashMap::new())),
            user_requests: Arc::new(Mutex::new(HashMap::new())),
            request_listeners: Arc::new(Mutex::new(Vec::new())),
            node_status_listeners: Arc::new(Mutex::new(Vec::new())),
            transport,
            sender: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            schedule: None,
            baudrate,
        }
    }

    /// Attaches a network description, pre-populating a `UserRequest` entry
    /// for every request it declares.
    pub fn with_network(mut self, network: Arc<Network>) -> Self {
        {
            let mut table = self.user_requests.lock().unwrap();
            for request in &network.requests {
                table.insert(request.id, UserRequest::new(request));
            }
        }
        self.network = Some(network);
        self
    }

    pub fn virtual_bus(&self) -> Arc<Mutex<VirtualBus>> {
        self.virtual_bus.clone()
    }

    pub fn add_request_listener(&self, listener: Box<dyn RequestListener>) {
        self.request_listeners.lock().unwrap().push(listener);
    }

    pub fn add_node_status_listener(&self, listener: Box<dyn NodeStatusListener>) {
        self.node_status_listeners.lock().unwrap().push(listener);
    }

    pub fn get_node_status(&self, addr: u8) -> NodeStatus {
        self.node_status.lock().unwrap().get(&addr).cloned().unwrap_or_default()
    }

    /// Resets every request's buffered signal values back to each signal's
    /// `initial` value.
    pub fn reset_user_requests(&self) {
        let Some(network) = &self.network else { return };
        let mut table = self.user_requests.lock().unwrap();
        for request in &network.requests {
            table.insert(request.id, UserRequest::new(request));
        }
    }

    /// Clears every known address's `NodeStatus` back to all-absent,
    /// notifying node-status listeners of the reset on every property.
    pub fn reset_nodestatus(&self) {
        let addrs: Vec<u8> = self.node_status.lock().unwrap().keys().copied().collect();
        let properties = [
            NodeStatusProperty::OpStatus,
            NodeStatusProperty::PowerStatus,
            NodeStatusProperty::SerialNumber,
            NodeStatusProperty::SoftwareVersion,
        ];
        for addr in addrs {
            self.node_status.lock().unwrap().insert(addr, NodeStatus::default());
            let status = NodeStatus::default();
            for property in properties {
                for listener in self.node_status_listeners.lock().unwrap().iter_mut() {
                    listener.on_node_change(addr, property, &status);
                }
            }
        }
    }

    /// Spawns the worker thread, taking exclusive ownership of the
    /// transport for the lifetime of the run. Idempotent.
    pub fn enter(&mut self) {
        if self.sender.is_some() {
            return;
        }
        let (tx, rx) = sync_channel(QUEUE_CAPACITY);
        self.running.store(true, Ordering::SeqCst);

        let worker = std::thread::Builder::new()
            .name("line-master-worker".to_string())
            .spawn({
                let transport = self.transport.take();
                let network = self.network.clone();
                let virtual_bus = self.virtual_bus.clone();
                let node_status = self.node_status.clone();
                let user_requests = self.user_requests.clone();
                let request_listeners = self.request_listeners.clone();
                let node_status_listeners = self.node_status_listeners.clone();
                let running = self.running.clone();
                move || {
                    run_worker(
                        rx,
                        transport,
                        network,
                        virtual_bus,
                        node_status,
                        user_requests,
                        request_listeners,
                        node_status_listeners,
                        running,
                    );
                }
            })
            .expect("failed to spawn line-master worker thread");

        self.sender = Some(tx);
        self.worker = Some(worker);
    }

    /// Disables any active schedule, signals the worker to stop and joins
    /// it. Safe to call more than once (property 6): the second call finds
    /// no sender and no worker and does nothing.
    pub fn exit(&mut self) {
        self.disable_schedule();
        self.running.store(false, Ordering::SeqCst);
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn handle(&self) -> Arc<dyn MasterHandle> {
        Arc::new(LineMasterHandle {
            sender: self.sender.clone().expect("enter() must run before enabling a schedule"),
        })
    }

    /// Starts a schedule thread running the named schedule, stopping any
    /// schedule already active first.
    pub fn enable_schedule(&mut self, name: &str) -> Result<()> {
        self.disable_schedule();
        let network = self.network.as_ref().ok_or_else(|| Error::Config("no network loaded".to_string()))?;
        let schedule = network.get_schedule(name)?.clone();
        let mut executor = create_executor(&schedule, self.baudrate);
        let handle = self.handle();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let thread = std::thread::Builder::new()
            .name(format!("line-schedule-{name}"))
            .spawn(move || {
                while thread_running.load(Ordering::SeqCst) {
                    if let Some(entry) = executor.next() {
                        entry.perform(handle.as_ref());
                    }
                    executor.wait();
                }
            })
            .expect("failed to spawn schedule thread");

        self.schedule = Some(ScheduleHandle { running, thread });
        Ok(())
    }

    pub fn disable_schedule(&mut self) {
        if let Some(sched) = self.schedule.take() {
            sched.running.store(false, Ordering::SeqCst);
            let _ = sched.thread.join();
        }
    }

    fn resolve_request_id(&self, id_or_name: &str) -> Result<u16> {
        match &self.network {
            Some(network) => Ok(network.get_request(id_or_name)?.id),
            None => id_or_name
                .parse()
                .map_err(|_| Error::Lookup { kind: "request", key: id_or_name.to_string() }),
        }
    }

    fn submit(&self, request: u16, payload: Payload, wait: bool, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let sender = self.sender.as_ref().expect("call enter() before issuing requests");
        let handle = if wait { Some(EventHandle::new()) } else { None };
        sender
            .send(WorkItem { request, payload, handle: handle.clone() })
            .map_err(|_| Error::TransportError)?;

        let Some(handle) = handle else { return Ok(Vec::new()) };
        if !handle.wait(timeout) {
            return Err(Error::Timeout);
        }
        if let Some(err) = handle.take_exception() {
            return Err(Arc::try_unwrap(err).unwrap_or_else(|arc| Error::Config(arc.to_string())));
        }
        Ok(handle.take_response().unwrap_or_default())
    }

    /// Submits an `RxRequest` for `id_or_name` (looked up in the network by
    /// name or numeric id).
    pub fn request(&self, id_or_name: &str, wait: bool, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let id = self.resolve_request_id(id_or_name)?;
        self.submit(id, Payload::Rx, wait, timeout)
    }

    pub fn request_by_id(&self, id: u16, wait: bool, timeout: Option<Duration>) -> Result<Vec<u8>> {
        self.submit(id, Payload::Rx, wait, timeout)
    }

    /// Submits a `TxRequest` writing `data` under `id`.
    pub fn send_request(
        &self,
        id: u16,
        data: Vec<u8>,
        checksum: Option<u8>,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.submit(id, Payload::Tx { data, checksum }, wait, timeout).map(|_| ())
    }

    pub fn wakeup(&self, wait: bool, timeout: Option<Duration>) -> Result<()> {
        self.send_request(REQ_WAKEUP, Vec::new(), None, wait, timeout)
    }

    pub fn idle(&self, wait: bool, timeout: Option<Duration>) -> Result<()> {
        self.send_request(REQ_IDLE, Vec::new(), None, wait, timeout)
    }

    pub fn shutdown(&self, wait: bool, timeout: Option<Duration>) -> Result<()> {
        self.send_request(REQ_SHUTDOWN, Vec::new(), None, wait, timeout)
    }

    pub fn conditional_change_address(
        &self,
        serial: u32,
        new_addr: u8,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut data = serial.to_le_bytes().to_vec();
        data.push(new_addr);
        self.send_request(REQ_COND_CHANGE_ADDRESS, data, None, wait, timeout)
    }

    pub fn get_operation_status(&self, addr: u8, wait: bool, timeout: Option<Duration>) -> Result<Option<String>> {
        self.submit(REQ_OP_STATUS | addr as u16, Payload::Rx, wait, timeout)?;
        Ok(if wait { self.node_status.lock().unwrap().get(&addr).and_then(|s| s.op_status.clone()) } else { None })
    }

    pub fn get_power_status(&self, addr: u8, wait: bool, timeout: Option<Duration>) -> Result<Option<PowerStatus>> {
        self.submit(REQ_POWER_STATUS | addr as u16, Payload::Rx, wait, timeout)?;
        Ok(if wait { self.node_status.lock().unwrap().get(&addr).and_then(|s| s.power_status) } else { None })
    }

    pub fn get_serial_number(&self, addr: u8, wait: bool, timeout: Option<Duration>) -> Result<Option<u32>> {
        self.submit(REQ_SERIAL_NUMBER | addr as u16, Payload::Rx, wait, timeout)?;
        Ok(if wait { self.node_status.lock().unwrap().get(&addr).and_then(|s| s.serial_number) } else { None })
    }

    pub fn get_software_version(&self, addr: u8, wait: bool, timeout: Option<Duration>) -> Result<Option<String>> {
        self.submit(REQ_SW_NUMBER | addr as u16, Payload::Rx, wait, timeout)?;
        Ok(if wait {
            self.node_status.lock().unwrap().get(&addr).and_then(|s| s.software_version.clone())
        } else {
            None
        })
    }
}

impl Drop for LineMaster {
    fn drop(&mut self) {
        self.exit();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    rx: Receiver<WorkItem>,
    mut transport: Option<LineTransport<Box<dyn ByteStream>>>,
    network: Option<Arc<Network>>,
    virtual_bus: Arc<Mutex<VirtualBus>>,
    node_status: Arc<Mutex<HashMap<u8, NodeStatus>>>,
    user_requests: Arc<Mutex<HashMap<u16, UserRequest>>>,
    request_listeners: Arc<Mutex<Vec<Box<dyn RequestListener>>>>,
    node_status_listeners: Arc<Mutex<Vec<Box<dyn NodeStatusListener>>>>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let item = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match item.payload {
            Payload::Tx { data, checksum } => {
                let result = match &mut transport {
                    Some(t) => t.send_data(item.request, &data, checksum),
                    None => Ok(()),
                };
                virtual_bus.lock().unwrap().on_request_complete(item.request, &data);
                if let Some(handle) = &item.handle {
                    match result {
                        Ok(()) => handle.signal_response(data),
                        Err(err) => handle.signal_exception(Arc::new(err)),
                    }
                }
            }
            Payload::Rx => {
                let vbus_response = virtual_bus.lock().unwrap().on_request(item.request);
                let resolved = match vbus_response {
                    Ok(Some(data)) => {
                        if let Some(t) = &mut transport {
                            if let Err(err) = t.write_response(&data, None) {
                                log::warn!("failed to mirror simulated response for {:#06x}: {err}", item.request);
                            }
                        }
                        Ok(data)
                    }
                    Ok(None) => match &mut transport {
                        Some(t) => t.request_data(item.request),
                        None => Err(Error::TransportError),
                    },
                    Err(err) => Err(err),
                };

                match resolved {
                    Ok(data) => {
                        process_diagnostic_request(item.request, &data, &node_status, &node_status_listeners);
                        process_user_request(item.request, &data, &network, &user_requests, &request_listeners);
                        virtual_bus.lock().unwrap().on_request_complete(item.request, &data);
                        if let Some(handle) = &item.handle {
                            handle.signal_response(data);
                        }
                    }
                    Err(err) => {
                        let err = Arc::new(err);
                        virtual_bus.lock().unwrap().on_error(item.request, &err);
                        for listener in request_listeners.lock().unwrap().iter_mut() {
                            listener.on_error(Instant::now(), item.request, "transport_error");
                        }
                        if let Some(handle) = &item.handle {
                            handle.signal_exception(err);
                        }
                    }
                }
            }
        }
    }
}

fn process_diagnostic_request(
    request: u16,
    data: &[u8],
    node_status: &Arc<Mutex<HashMap<u8, NodeStatus>>>,
    node_status_listeners: &Arc<Mutex<Vec<Box<dyn NodeStatusListener>>>>,
) {
    let addr = (request & 0x0f) as u8;
    let property = match request & REQUEST_ID_MASK {
        REQ_OP_STATUS if !data.is_empty() => {
            node_status.lock().unwrap().entry(addr).or_default().op_status = Some(op_status_str(data[0]));
            Some(NodeStatusProperty::OpStatus)
        }
        REQ_POWER_STATUS if data.len() >= 3 => {
            node_status.lock().unwrap().entry(addr).or_default().power_status = Some(PowerStatus {
                voltage: data[0] as f64 / 10.0,
                op_current: data[1],
                sleep_current: data[2],
            });
            Some(NodeStatusProperty::PowerStatus)
        }
        // §9: the peripheral writes four little-endian bytes; standardise
        // on that instead of reproducing the source's three-big-endian-byte
        // read, which the design notes call a bug.
        REQ_SERIAL_NUMBER if data.len() >= 4 => {
            let serial = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            node_status.lock().unwrap().entry(addr).or_default().serial_number = Some(serial);
            Some(NodeStatusProperty::SerialNumber)
        }
        REQ_SW_NUMBER if data.len() >= 3 => {
            node_status.lock().unwrap().entry(addr).or_default().software_version =
                Some(format!("{}.{}.{}", data[0], data[1], data[2]));
            Some(NodeStatusProperty::SoftwareVersion)
        }
        _ => None,
    };

    if let Some(property) = property {
        let status = node_status.lock().unwrap().get(&addr).cloned().unwrap_or_default();
        for listener in node_status_listeners.lock().unwrap().iter_mut() {
            listener.on_node_change(addr, property, &status);
        }
    }
}

fn process_user_request(
    request: u16,
    data: &[u8],
    network: &Option<Arc<Network>>,
    user_requests: &Arc<Mutex<HashMap<u16, UserRequest>>>,
    request_listeners: &Arc<Mutex<Vec<Box<dyn RequestListener>>>>,
) {
    let Some(network) = network else { return };
    if !user_requests.lock().unwrap().contains_key(&request) {
        return;
    }
    let Ok(req) = network.get_request_by_id(request) else { return };
    match req.decode(data) {
        Ok(signals) => {
            {
                let mut table = user_requests.lock().unwrap();
                if let Some(entry) = table.get_mut(&request) {
                    entry.last_timestamp = Some(Instant::now());
                    entry.signals = signals.clone();
                    entry.exception = None;
                }
            }
            for listener in request_listeners.lock().unwrap().iter_mut() {
                listener.on_request(Instant::now(), req, &signals);
            }
        }
        Err(err) => {
            if let Some(entry) = user_requests.lock().unwrap().get_mut(&request) {
                entry.exception = Some(Arc::new(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Encoder, Node, Signal, Value};
    use crate::simulation::SimulatedPeripheral;
    use crate::vbus::BusMember;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct MemoryStream {
        inbound: VecDeque<u8>,
    }
    impl ByteStream for MemoryStream {
        fn write_all(&mut self, _buf: &[u8]) -> Result<()> {
            Ok(())
        }
        fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>> {
            Ok(self.inbound.pop_front())
        }
    }

    fn op_status_node() -> Arc<Node> {
        Arc::new(Node::new("Sensor", 3))
    }

    // Scenario F: a simulated peripheral with op_status='Ok' answers
    // get_operation_status(addr, wait=true) with 'Ok' and NodeStatus is
    // updated before the call returns.
    #[test]
    fn scenario_f_operation_status_round_trip() {
        let mut master = LineMaster::new(None, 19200);
        let peripheral = Arc::new(StdMutex::new(SimulatedPeripheral::new(op_status_node())));
        peripheral.lock().unwrap().connected = true;
        peripheral.lock().unwrap().op_status = Some("Ok".to_string());
        master.virtual_bus().lock().unwrap().add(peripheral.clone() as Arc<StdMutex<dyn BusMember>>);

        master.enter();
        let status = master.get_operation_status(3, true, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(status, Some("Ok".to_string()));
        assert_eq!(master.get_node_status(3).op_status, Some("Ok".to_string()));
        master.exit();
    }

    #[test]
    fn request_through_a_real_transport() {
        let stream: Box<dyn ByteStream> = Box::new(MemoryStream { inbound: VecDeque::from(vec![0x01, 0x01, 0xA5]) });
        let transport = LineTransport::new(stream, false);
        let mut master = LineMaster::new(Some(transport), 19200);
        master.enter();
        let data = master.request_by_id(0x0200, true, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(data, vec![0x01]);
        master.exit();
    }

    #[test]
    fn exit_is_idempotent() {
        let mut master = LineMaster::new(None, 19200);
        master.enter();
        master.exit();
        master.exit();
    }

    #[test]
    fn send_without_a_transport_still_completes_and_fans_out_to_the_bus() {
        let mut master = LineMaster::new(None, 19200);
        master.enter();
        master.wakeup(true, Some(Duration::from_secs(1))).unwrap();
        master.exit();
    }

    #[test]
    fn request_without_transport_or_responder_times_out() {
        let mut master = LineMaster::new(None, 19200);
        master.enter();
        let result = master.request_by_id(0x1000, true, Some(Duration::from_millis(50)));
        assert!(result.is_err());
        master.exit();
    }

    #[test]
    fn wheel_speed_publish_updates_user_request_signals() {
        let signal = Signal {
            name: "Speed".into(),
            offset: 0,
            width: 16,
            initial: Value::Float(0.0),
            encoder: Encoder::Formula { name: "speed".into(), scale: 0.1, offset: 0.0, unit: "".into() },
        };
        let request = Arc::new(crate::network::Request::new("WheelSpeed", 0x1000, 5, vec![signal]).unwrap());
        let mut node = Node::new("RotorSensor", 1);
        node.publishes.push(request.clone());
        let node = Arc::new(node);

        let mut network = Network::new("n");
        network.requests.push(request.clone());
        network.nodes.push(node.clone());

        let mut master = LineMaster::new(None, 19200).with_network(Arc::new(network));
        let peripheral = Arc::new(StdMutex::new(SimulatedPeripheral::new(node)));
        peripheral.lock().unwrap().connected = true;
        peripheral.lock().unwrap().set_signal(0x1000, "Speed", Value::Float(12.3));
        master.virtual_bus().lock().unwrap().add(peripheral as Arc<StdMutex<dyn BusMember>>);

        master.enter();
        let data = master.request_by_id(0x1000, true, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(data, vec![0x7B, 0x00, 0x00, 0x00, 0x00]);
        master.exit();
    }
}
