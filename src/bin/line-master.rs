/*! Drives a real LINE bus over a serial port: one-shot diagnostic calls,
an ad-hoc request, or a network schedule, until interrupted.

```no_run
$ line-master --port /dev/ttyUSB0 --baudrate 19200 wakeup
$ line-master --port /dev/ttyUSB0 --network bus.json request WheelSpeed
$ line-master --port /dev/ttyUSB0 --network bus.json schedule Poll
```
*/
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use line_protocol::master::LineMaster;
use line_protocol::network::loader::load_network;
use line_protocol::transport::{ByteStream, LineTransport};
use line_protocol::Result;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Serial device to open.
    #[arg(long)]
    port: String,

    #[arg(long, default_value = "19200")]
    baudrate: u32,

    /// Network JSON description; required for `request` and `schedule`.
    #[arg(long)]
    network: Option<PathBuf>,

    /// Treat the link as one-wire (echo of our own writes comes back).
    #[arg(long)]
    one_wire: bool,

    #[arg(short = 'v', default_value = "0")]
    verbose: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    Wakeup,
    Idle,
    Shutdown,
    /// Issue a single named or numeric request and print the response.
    Request { name: String },
    /// Run a named schedule until interrupted.
    Schedule { name: String },
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

    let port = serialport::new(&opt.port, opt.baudrate).open()?;
    let stream: Box<dyn ByteStream> = Box::new(port);
    let transport = LineTransport::new(stream, opt.one_wire);

    let mut master = LineMaster::new(Some(transport), opt.baudrate);
    if let Some(path) = &opt.network {
        master = master.with_network(Arc::new(load_network(path)?));
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

    match &opt.command {
        Command::Wakeup => master.wakeup(true, Some(DEFAULT_TIMEOUT))?,
        Command::Idle => master.idle(true, Some(DEFAULT_TIMEOUT))?,
        Command::Shutdown => master.shutdown(true, Some(DEFAULT_TIMEOUT))?,
        Command::Request { name } => {
            let data = master.request(name, true, Some(DEFAULT_TIMEOUT))?;
            log::info!("{name}: {data:02x?}");
        }
        Command::Schedule { name } => {
            master.enable_schedule(name)?;
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }
            master.disable_schedule();
        }
    }

    master.exit();
    Ok(())
}
