#![allow(missing_docs)]

use std::{sync::Arc, time::Instant};

use clap::Parser;
use color_eyre::eyre::{ensure, WrapErr};
use ordinator::{
    page::MIN_PAGE_SIZE, BudgetAccountant, HeapPagePool, IdSpace, Ordinator, OrdinatorConfig,
    DEFAULT_PAGE_SIZE,
};
use rand::prelude::*;
use rand_pcg::Pcg64;

/// Assigns ids to randomly drawn keys and reports how the table evolves.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of keys to add, including repetitions.
    #[clap(short = 'n', long, default_value = "1000000")]
    keys: usize,
    /// Number of distinct keys the added keys are drawn from.
    #[clap(short = 'd', long, default_value = "100000", value_parser = clap::value_parser!(u64).range(1..))]
    distinct: u64,
    #[clap(short = 's', long, default_value = "0")]
    seed: u64,
    #[clap(short = 'p', long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
    /// Memory budget in bytes, unlimited when omitted.
    #[clap(short = 'b', long)]
    budget: Option<usize>,
    #[clap(long)]
    small_capacity: Option<usize>,
    #[clap(long, default_value = "4096")]
    batch: usize,
}

fn check_args(args: &Args) -> color_eyre::Result<()> {
    ensure!(
        args.page_size.is_power_of_two() && args.page_size >= MIN_PAGE_SIZE,
        "page size {} must be a power of two of at least {MIN_PAGE_SIZE}",
        args.page_size
    );
    if let Some(capacity) = args.small_capacity {
        ensure!(
            capacity.is_power_of_two() && capacity <= args.page_size / 8,
            "small capacity {capacity} must be a power of two of at most {}",
            args.page_size / 8
        );
    }
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    let args = Args::parse();

    color_eyre::install()?;
    ordinator_logger::setup();

    log::info!("{args:?}");

    check_args(&args)?;

    let pool = Arc::new(HeapPagePool::new(args.page_size));
    let accountant = Arc::new(
        args.budget
            .map_or_else(BudgetAccountant::unlimited, BudgetAccountant::new),
    );
    let mut config = OrdinatorConfig::default();
    if let Some(capacity) = args.small_capacity {
        config = config.with_small_capacity(capacity);
    }

    let mut ordinator = Ordinator::with_config(
        config,
        pool.clone(),
        accountant.clone(),
        Arc::new(IdSpace::new()),
    )?;
    log::info!("{}", ordinator.status());

    let mut rng = Pcg64::seed_from_u64(args.seed);
    let distinct: Vec<i64> = (0..args.distinct).map(|_| rng.gen()).collect();

    let mut keys = Vec::with_capacity(args.batch);
    let mut ids = Vec::with_capacity(args.batch);
    let mut grow_count = ordinator.status().grow_count();
    let mut added = 0;

    let start = Instant::now();
    while added < args.keys {
        let batch = (args.keys - added).min(args.batch.max(1));
        keys.clear();
        keys.extend((0..batch).map(|_| distinct[rng.gen_range(0..distinct.len())]));
        ids.clear();
        ordinator
            .add_many(&keys, &mut ids)
            .wrap_err_with(|| format!("adding keys failed after {} keys", added + ids.len()))?;
        added += batch;

        let status = ordinator.status();
        if status.grow_count() != grow_count {
            grow_count = status.grow_count();
            log::info!("{status}");
        }
    }
    log::info!("added {added} keys in {:.2?}", start.elapsed());

    let start = Instant::now();
    for &key in &distinct {
        if let Some(id) = ordinator.find(key) {
            ensure!((id as usize) < ordinator.len(), "id {id} out of range");
        }
    }
    log::info!("looked up {} keys in {:.2?}", distinct.len(), start.elapsed());
    ensure!(ordinator.iter().count() == ordinator.len());

    log::info!("{}", ordinator.status());
    log::info!(
        "{} distinct keys seen, peak charge {} bytes, pages recycled {} of {}",
        ordinator.len(),
        accountant.peak(),
        pool.recycled(),
        pool.lent(),
    );

    ordinator.close();
    log::info!(
        "after close: {} bytes charged, {} pages outstanding",
        accountant.used(),
        pool.outstanding()
    );

    Ok(())
}
