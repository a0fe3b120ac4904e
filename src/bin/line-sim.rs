/*! Runs a `LineMaster` against a virtual bus of simulated peripherals built
from a network description, with no serial port attached. Useful for
exercising a schedule offline and watching the resulting traffic and
node-status changes on stdout.

```no_run
$ line-sim --network bus.json schedule Poll
```
*/
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser;

use line_protocol::constants::{BROADCAST_ID, MASTER_ADDRESS};
use line_protocol::master::{LineMaster, NodeStatus, NodeStatusListener, NodeStatusProperty, RequestListener};
use line_protocol::network::loader::load_network;
use line_protocol::network::{Request, SignalValueContainer};
use line_protocol::simulation::SimulatedPeripheral;
use line_protocol::vbus::BusMember;
use line_protocol::Result;

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Network JSON description to simulate.
    #[arg(long)]
    network: PathBuf,

    #[arg(long, default_value = "19200")]
    baudrate: u32,

    #[arg(short = 'v', default_value = "0")]
    verbose: usize,

    /// Schedule to run; omit to just bring peripherals up and idle.
    #[arg(long)]
    schedule: Option<String>,
}

struct StdoutRequestListener;
impl RequestListener for StdoutRequestListener {
    fn on_request(&mut self, _timestamp: Instant, request: &Arc<Request>, signals: &SignalValueContainer) {
        let values: Vec<String> = request
            .signals
            .iter()
            .filter_map(|s| signals.get(&s.name).ok().map(|v| format!("{}={:?}", s.name, v.phy)))
            .collect();
        println!("{}: {}", request.name, values.join(", "));
    }

    fn on_error(&mut self, _timestamp: Instant, request: u16, kind: &str) {
        println!("request {request:#06x} failed: {kind}");
    }
}

struct StdoutNodeStatusListener;
impl NodeStatusListener for StdoutNodeStatusListener {
    fn on_node_change(&mut self, address: u8, property: NodeStatusProperty, status: &NodeStatus) {
        println!("node {address}: {property:?} -> {status:?}");
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("line_protocol")
        .quiet(false)
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .expect("failed to initialize logging");

    let network = Arc::new(load_network(&opt.network)?);
    let mut master = LineMaster::new(None, opt.baudrate).with_network(network.clone());
    master.add_request_listener(Box::new(StdoutRequestListener));
    master.add_node_status_listener(Box::new(StdoutNodeStatusListener));

    {
        let bus = master.virtual_bus();
        let mut bus = bus.lock().unwrap();
        for node in &network.nodes {
            if node.address == MASTER_ADDRESS || node.address == BROADCAST_ID {
                continue;
            }
            let mut peripheral = SimulatedPeripheral::new(node.clone());
            peripheral.connected = true;
            bus.add(Arc::new(Mutex::new(peripheral)) as Arc<Mutex<dyn BusMember>>);
        }
    }

    master.enter();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            eprintln!("received Ctrl+C, shutting down");
            running.store(false, Ordering::SeqCst);
        })
        .expect("failed to install Ctrl-C handler");
    }

    if let Some(name) = &opt.schedule {
        master.enable_schedule(name)?;
    }
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    master.disable_schedule();
    master.exit();
    Ok(())
}
