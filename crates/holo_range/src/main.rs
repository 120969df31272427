//! Admin CLI for a single-store range keyspace on disk.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use holo_range::clock::SystemClock;
use holo_range::keys::fmt_key;
use holo_range::kv::{FjallEngine, KvEngine};
use holo_range::{
    merge_range_addressing, split_range_addressing, AddressingIndex, Db, LocalSender,
    LocalSenderConfig, RangeDescriptor, Store, StoreIdent,
};

#[derive(Parser, Debug)]
#[command(name = "holo-range")]
#[command(about = "Range addressing admin tool", long_about = None)]
struct Args {
    /// Directory holding the store's keyspace.
    #[arg(long, env = "HOLO_RANGE_DATA_DIR")]
    data_dir: PathBuf,
    #[arg(long, env = "HOLO_RANGE_NODE_ID", default_value_t = 1)]
    node_id: u64,
    #[arg(long, env = "HOLO_RANGE_STORE_ID", default_value_t = 1)]
    store_id: u64,
    /// Total local routing attempts per command.
    #[arg(long, env = "HOLO_RANGE_ROUTE_MAX_ATTEMPTS", default_value_t = 2)]
    route_max_attempts: usize,
    /// Interpret key and value arguments as hex bytes (no 0x prefix).
    #[arg(long, default_value_t = false)]
    hex: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the first range and its addressing records.
    Bootstrap,
    /// Split the range that owns the provided key at that key.
    Split {
        #[arg(long)]
        key: String,
    },
    /// Merge the range that owns the provided key with its right-hand neighbor.
    Merge {
        #[arg(long)]
        key: String,
    },
    /// Resolve a key through the addressing index.
    Lookup {
        #[arg(long)]
        key: String,
    },
    /// Print the addressing index and verify it.
    Meta,
    Put {
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    Get {
        #[arg(long)]
        key: String,
    },
}

/// Open store, sender and client over one data directory.
struct Node {
    store: Arc<Store>,
    sender: Arc<LocalSender>,
    db: Db,
}

impl Node {
    /// Open the keyspace and store, refusing an empty store unless bootstrapping.
    fn open(args: &Args, bootstrap: bool) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&args.data_dir).context("create data dir")?;
        let engine: Arc<dyn KvEngine> =
            Arc::new(FjallEngine::open_path(&args.data_dir).context("open keyspace")?);
        let ident = StoreIdent {
            node_id: args.node_id,
            store_id: args.store_id,
        };
        let store = Arc::new(Store::open(ident, engine).context("open store")?);
        if bootstrap {
            store.bootstrap_range().context("bootstrap first range")?;
        } else if store.range_count() == 0 {
            bail!(
                "store {} in {} has no ranges; run `bootstrap` first",
                args.store_id,
                args.data_dir.display()
            );
        }

        let sender = Arc::new(LocalSender::with_config(LocalSenderConfig {
            max_attempts: args.route_max_attempts,
        }));
        sender.add_store(store.clone());
        let db = Db::new(sender.clone(), Arc::new(SystemClock));
        Ok(Self { store, sender, db })
    }

    /// Descriptor of the local range holding `key`.
    fn owning_range(&self, key: &[u8]) -> anyhow::Result<RangeDescriptor> {
        let (range_id, _) = self
            .sender
            .lookup_replica(key, b"")
            .with_context(|| format!("no local range owns {}", fmt_key(key)))?;
        let handle = self
            .store
            .range(range_id)
            .with_context(|| format!("range {range_id} disappeared"))?;
        Ok(handle.desc)
    }

    /// Split locally, then write the addressing records in one batch.
    fn split(&self, key: &[u8]) -> anyhow::Result<(RangeDescriptor, RangeDescriptor)> {
        let parent = self.owning_range(key)?;
        // Reject splits the addressing layout cannot express before touching
        // the local descriptors.
        let check_left = RangeDescriptor {
            end_key: key.to_vec(),
            ..parent.clone()
        };
        let check_right = RangeDescriptor {
            start_key: key.to_vec(),
            ..parent.clone()
        };
        split_range_addressing(&check_left, &check_right)?;

        let (left, right) = self.store.split_range(parent.range_id, key)?;
        let ops = split_range_addressing(&left, &right)?;
        self.db
            .apply_meta_ops(ops)
            .context("write split addressing records")?;
        Ok((left, right))
    }

    /// Merge the range holding `key` with its right neighbour.
    fn merge(&self, key: &[u8]) -> anyhow::Result<RangeDescriptor> {
        let left = self.owning_range(key)?;
        let (left, merged) = self.store.merge_range(left.range_id)?;
        let ops = merge_range_addressing(&left, &merged)?;
        self.db
            .apply_meta_ops(ops)
            .context("write merge addressing records")?;
        Ok(merged)
    }
}

/// Raw argument bytes, or hex-decoded with `--hex`.
fn parse_bytes(input: &str, hex: bool) -> anyhow::Result<Vec<u8>> {
    if !hex {
        return Ok(input.as_bytes().to_vec());
    }
    if !input.is_ascii() || input.len() % 2 != 0 {
        bail!("hex input must be an even number of hex digits");
    }
    (0..input.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&input[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte at offset {i}"))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    // Enable ANSI colors only when stdout is a terminal and NO_COLOR is unset.
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let node = Node::open(&args, matches!(args.command, Command::Bootstrap))?;

    match &args.command {
        Command::Bootstrap => {
            for desc in node.store.descriptors() {
                println!("bootstrapped {desc}");
            }
        }
        Command::Split { key } => {
            let key = parse_bytes(key, args.hex)?;
            let (left, right) = node.split(&key)?;
            println!("left  {left}");
            println!("right {right}");
        }
        Command::Merge { key } => {
            let key = parse_bytes(key, args.hex)?;
            let merged = node.merge(&key)?;
            println!("merged {merged}");
        }
        Command::Lookup { key } => {
            let key = parse_bytes(key, args.hex)?;
            let index = AddressingIndex::load(node.store.engine().as_ref())?;
            match index.lookup(&key) {
                Some(desc) => println!("{} -> {desc}", fmt_key(&key)),
                None => bail!("no addressing record covers {}", fmt_key(&key)),
            }
        }
        Command::Meta => {
            let index = AddressingIndex::load(node.store.engine().as_ref())?;
            for (key, desc) in index.records() {
                println!("{:<32} {desc}", fmt_key(key));
            }
            match index.verify() {
                Ok(()) => println!("ok: {} records", index.len()),
                Err(err) => bail!("addressing index is inconsistent: {err}"),
            }
        }
        Command::Put { key, value } => {
            let key = parse_bytes(key, args.hex)?;
            let value = parse_bytes(value, args.hex)?;
            node.db.put(&key, &value)?;
            println!("OK");
        }
        Command::Get { key } => {
            let key = parse_bytes(key, args.hex)?;
            match node.db.get(&key)? {
                Some(value) => println!("{}", value.escape_ascii()),
                None => println!("(nil)"),
            }
        }
    }
    Ok(())
}
