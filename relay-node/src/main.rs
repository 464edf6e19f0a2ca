//! Runs a store-and-forward mesh of radio nodes.
//!
//! `simulate` runs every node in its own thread over the in-process ether.
//! The origin reads its content from a source directory or from removable
//! media. Relays store what they receive in their own output directory, or on
//! removable media below `<media-root>/<node>` with a local copy in the output
//! directory until a medium is mounted.
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use radio_relay::device::sim::{Ether, EtherConfig};
use radio_relay::{
    ChannelPartition, ChannelTable, Node, NodeId, RelayConfig, Role, Shutdown, Storage,
};

mod storage;

use storage::{Directory, RemovableMedia};

#[derive(Parser, Debug)]
#[command(name = "relay-node", version, about = "Store-and-forward file relay over packet radios")]
struct Cli {
    /// More logs, repeat for more (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a mesh of nodes over a simulated radio medium
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Node broadcasting the source content
    #[arg(long, default_value = "tan0")]
    origin: NodeId,

    /// Nodes taking part, comma separated
    #[arg(long, value_delimiter = ',', default_value = "tan0,tan1,tbn0,tbn1")]
    nodes: Vec<NodeId>,

    /// Directory holding the `.txt` file to broadcast, instead of removable media
    #[arg(long)]
    source: Option<PathBuf>,

    /// Per-node mount roots live in `<media-root>/<node>`
    #[arg(long)]
    media_root: Option<PathBuf>,

    /// Relays write `<out-dir>/<node>/file_received`, or keep their local copy
    /// there while no medium is mounted
    #[arg(long, default_value = "received")]
    out_dir: PathBuf,

    /// Stop once every relay has stored the content
    #[arg(long)]
    exit_when_done: bool,

    /// Probability for a receiver to miss a frame
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Time on air of one frame, in milliseconds
    #[arg(long, default_value_t = 1)]
    airtime_ms: u64,

    /// Busy samples taken on each own channel
    #[arg(long)]
    scan_passes: Option<u32>,

    /// Settling delay after tuning, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Time spent listening on each channel while hunting, in milliseconds
    #[arg(long)]
    dwell_ms: Option<u64>,

    /// Silence after which a locked channel is given up, in milliseconds
    #[arg(long)]
    silence_ms: Option<u64>,

    /// Digest mismatches after which a transfer is abandoned
    #[arg(long)]
    failure_threshold: Option<u32>,
}

impl SimulateArgs {
    fn relay_config(&self) -> RelayConfig {
        let mut config = RelayConfig::default();
        if let Some(passes) = self.scan_passes {
            config.scan_passes = passes;
        }
        if let Some(ms) = self.settle_ms {
            config.settle = Duration::from_millis(ms);
        }
        if let Some(ms) = self.dwell_ms {
            config.dwell = Duration::from_millis(ms);
        }
        if let Some(ms) = self.silence_ms {
            config.silence_timeout = Duration::from_millis(ms);
        }
        if let Some(threshold) = self.failure_threshold {
            config.failure_threshold = threshold;
        }
        config
    }

    fn validate(&self) -> Result<()> {
        if !self.nodes.contains(&self.origin) {
            bail!("origin {} is not one of the nodes", self.origin);
        }
        if !(0.0..=1.0).contains(&self.loss) {
            bail!("loss must be within [0, 1], got {}", self.loss);
        }
        if self.exit_when_done && self.nodes.iter().all(|id| *id == self.origin) {
            bail!("--exit-when-done needs at least one relay");
        }
        Ok(())
    }

    fn origin_storage(&self) -> Box<dyn Storage + Send> {
        match (&self.source, &self.media_root) {
            (Some(dir), _) => Box::new(Directory::new(dir)),
            (None, Some(root)) => {
                Box::new(RemovableMedia::new(root.join(self.origin.as_str()), None))
            }
            (None, None) => Box::new(RemovableMedia::new("/media", None)),
        }
    }

    /// Storage of a relay, and the file that shows up once it got the content.
    fn relay_storage(&self, id: NodeId) -> (Box<dyn Storage + Send>, PathBuf) {
        let local = Directory::new(self.out_dir.join(id.as_str()));
        let received = local.received_file();
        match &self.media_root {
            Some(root) => {
                let media = RemovableMedia::new(root.join(id.as_str()), Some(received.clone()));
                (Box::new(media), received)
            }
            None => (Box::new(local), received),
        }
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            let current = thread::current();
            writeln!(
                buf,
                "[{:5} {:4}] {}",
                record.level(),
                current.name().unwrap_or("main"),
                record.args()
            )
        })
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Command::Simulate(args) => simulate(args),
    }
}

fn simulate(args: SimulateArgs) -> Result<()> {
    args.validate()?;

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Interrupted, stopping nodes");
            shutdown.trigger();
        })
        .context("failed to install the interrupt handler")?;
    }

    let ether = Ether::new(EtherConfig {
        airtime: Duration::from_millis(args.airtime_ms),
        loss: args.loss,
        ..Default::default()
    });
    let table = ChannelTable::standard();
    let config = args.relay_config();

    let mut handles = Vec::new();
    let mut outputs = Vec::new();
    for &id in &args.nodes {
        let partition = ChannelPartition::for_node(&table, id)?;
        let (role, mut storage) = if id == args.origin {
            (Role::Origin, args.origin_storage())
        } else {
            let (storage, received) = args.relay_storage(id);
            outputs.push(received);
            (Role::Relay, storage)
        };
        let mut node = Node::new(ether.attach(), partition, config, shutdown.clone());
        info!("{}: {:?}, transmits on {:?}", id, role, node.partition().own());
        let handle = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || {
                let res = node.run(role, &mut storage);
                node.power_down();
                res
            })
            .with_context(|| format!("failed to start node {}", id))?;
        handles.push((id, handle));
    }

    if args.exit_when_done {
        while !shutdown.is_triggered() && !outputs.iter().all(|path| path.exists()) {
            thread::sleep(Duration::from_millis(100));
        }
        if !shutdown.is_triggered() {
            info!("Every relay stored the content");
            shutdown.trigger();
        }
    }

    let mut failed = 0;
    for (id, handle) in handles {
        match handle.join() {
            Ok(Err(err)) if err.is_interrupt() => info!("{}: stopped", id),
            Ok(Err(err)) => {
                error!("{}: {}", id, err);
                failed += 1;
            }
            Ok(Ok(never)) => match never {},
            Err(_) => {
                error!("{}: node thread panicked", id);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!("{} node(s) failed", failed));
    }
    Ok(())
}
