pub mod ext;
pub mod krist;
pub mod miner;
pub mod network;
pub mod utils;

use crate::krist::address::Address;
use crate::miner::device::DeviceMiner;
use crate::miner::selector;
use crate::miner::state::MiningState;
use crate::miner::{MinerConfig, MinerError, Solution};
use crate::network::broker::SubmitSlot;
use crate::network::{client, NetConfig, NetworkError};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::process;
use std::sync::Arc;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(about)]
pub struct Opts {
    /// The address to mine for
    address: Option<Address>,

    #[structopt(flatten)]
    miner: MinerConfig,

    #[structopt(flatten)]
    net: NetConfig,

    /// Print the available OpenCL devices and exit
    #[structopt(long)]
    list_devices: bool,

    /// Run the device self-tests and exit without mining
    #[structopt(long)]
    tests_only: bool,

    /// Log protocol traffic and worker internals
    #[structopt(short, long)]
    verbose: bool,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Miner(#[from] MinerError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => 1,
            Error::Miner(e) => e.exit_code(),
            Error::Network(_) => 4,
            Error::Internal(_) => 3,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .expect("initializing logger");
}

fn main() {
    let opts = Opts::from_args();
    init_logging(opts.verbose);

    if let Err(e) = run(opts) {
        error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(opts: Opts) -> Result<(), Error> {
    if opts.list_devices {
        let mut out = String::new();
        ascii_tree::write_tree(&mut out, &selector::device_tree()?)
            .map_err(|e| Error::Internal(e.to_string()))?;
        eprintln!("{}", out);
        return Ok(());
    }

    let address = opts
        .address
        .ok_or_else(|| Error::Usage("an address is required unless --list-devices is given".into()))?;

    let devices = selector::select(&opts.miner)?;

    eprintln!("Initializing {} device(s)...", devices.len());
    let miners = devices
        .iter()
        .map(|entry| DeviceMiner::init(entry, &opts.miner))
        .collect::<Result<Vec<_>, _>>()?;

    info!("running self-tests");
    for miner in &miners {
        miner.test()?;
    }
    eprintln!("Self-tests passed");

    if opts.tests_only {
        return Ok(());
    }

    let slot = Arc::new(SubmitSlot::new());
    let state = {
        let slot = Arc::clone(&slot);
        Arc::new(MiningState::new(
            address,
            Box::new(move |solution: Solution| slot.submit_and_wait(solution)),
        ))
    };

    let multi_pb = MultiProgress::new();
    let spinner_style = ProgressStyle::default_spinner().template("{spinner} {prefix}: {wide_msg}");

    crossbeam::scope(|s| -> Result<(), Error> {
        let mut workers = vec![];

        for miner in miners {
            let pb = multi_pb.add(ProgressBar::new_spinner());
            pb.set_style(spinner_style.clone());
            pb.set_prefix(miner.name().to_string());

            let state = Arc::clone(&state);
            let handle = s
                .builder()
                .name(format!("miner on {}", miner.name()))
                .spawn(move |_| {
                    let result = miner.mine(&state, &pb);
                    pb.finish();
                    if let Err(e) = &result {
                        error!("worker failed: {}", e);
                        state.stop();
                    }
                    result
                })
                .map_err(|e| Error::Internal(e.to_string()))?;
            workers.push(handle);
        }

        s.spawn(|_| multi_pb.join());

        let net_result = client::run(&opts.net, Arc::clone(&state), Arc::clone(&slot));

        // mining is over one way or the other; wake everything for the join
        state.stop();
        slot.close();

        for handle in workers {
            handle
                .join()
                .map_err(|_| Error::Internal("worker thread panicked".into()))??;
        }

        net_result?;
        Ok(())
    })
    .map_err(|_| Error::Internal("worker scope panicked".into()))??;

    eprintln!(
        "Mined {} block(s), {} hashes checked",
        state.total_solved(),
        state.total_hashes()
    );

    Ok(())
}
