#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

/*
 * cosmicpi-daq: CosmicPi detector acquisition.
 * Authors: CosmicPi contributors
 * This program is shipped under Mozilla Public V2 license.
 */

use env_logger::{Builder, Env, Target};

use hifitime::Epoch;

use log::{debug, error, info, warn};

use tokio::{signal, task};

mod channel;
mod cli;
mod config;
mod error;
mod event;
mod link;
mod nmea;
mod packet;
mod pipeline;
mod position;
mod publish;

use crate::{
    cli::Cli,
    config::LinkSettings,
    link::{CloseHandle, LineSource},
    pipeline::Pipeline,
    publish::{FanOut, index::IndexSink, journal::Journal, relay::RelaySink},
};

/// Acquisition loop, runs on a blocking thread.
/// Replays the input files once, or keeps a detector link up until closed.
fn acquire(mut source: LineSource, settings: LinkSettings, files: Vec<String>, close: CloseHandle) {
    if !files.is_empty() {
        match source.open_files(&files) {
            Ok(_) => {
                if let Err(e) = source.run() {
                    error!("replay interrupted: {}", e);
                }
            },
            Err(e) => error!("{}", e),
        }
        return;
    }

    while !close.is_closed() {
        let opened = source
            .discover()
            .and_then(|device| source.open(&device, settings.baud_rate, settings.timeout_ms));

        match opened {
            Ok(_) => match source.run() {
                Ok(_) => debug!("link released"),
                Err(e) => warn!("{}: reopening", e),
            },
            Err(e) => debug!("{}", e),
        }

        if !close.is_closed() {
            std::thread::sleep(settings.retry_period());
        }
    }
}

#[tokio::main]
pub async fn main() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    // cli
    let cli = Cli::new();

    let settings = cli
        .settings()
        .unwrap_or_else(|e| panic!("invalid configuration: {}", e));

    let files = cli.files();

    // consumers
    let mut fanout = FanOut::new(
        settings.publication.queue_size,
        settings.publication.consumer_timeout(),
    );

    let mut workers = Vec::new();

    if settings.journal.enabled {
        workers.push(fanout.register(Journal::new()));
    }

    if settings.index.enabled {
        workers.push(fanout.register(IndexSink::new(&settings.index.path)));
    }

    if let Some(address) = settings.relay.address.as_deref() {
        workers.push(fanout.register(RelaySink::new(address)));
    }

    if fanout.is_empty() {
        warn!("no consumer: events are only counted");
    }

    let mut pipeline = Pipeline::new(fanout, settings.publication.stats_interval);
    let counters = pipeline.counters();

    let mut source = LineSource::new(settings.link.candidates.clone());
    source.subscribe(move |line| pipeline.process(line));

    // shutdown
    let close = source.close_handle();
    let shutdown = close.clone();

    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("signal handling error: {}", e);
            return;
        }
        info!("shutting down");
        shutdown.close();
    });

    match Epoch::now() {
        Ok(t) => info!("{} - application deployed", t),
        Err(_) => info!("application deployed"),
    }

    // the line source (hence the pipeline and its consumer queues) is released on return
    if let Err(e) = task::spawn_blocking(move || acquire(source, settings.link, files, close)).await
    {
        error!("acquisition task failure: {}", e);
    }

    for worker in workers {
        match worker.await {
            Ok(report) => info!("{}", report),
            Err(e) => error!("consumer task failure: {}", e),
        }
    }

    info!("{}", counters);
}
