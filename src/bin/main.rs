//! hyprstream-channels binary.
//!
//! Exercises a channel manager end to end: opens channels over local
//! socket pairs, talks through their bootstrap pipes, and tears them down.

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use hyprstream_channels::{
    config::{Args, ChannelsConfig},
    logging, ChannelIdAllocator, ChannelManager, IoThread, PlatformHandle,
};
use tracing::info;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ChannelsConfig::from_args(&args).context("failed to load configuration")?;
    logging::init(&config.logging);

    info!("hyprstream-channels starting up");

    let io_thread = IoThread::spawn(&config.io_thread)?;
    let callback_thread = IoThread::spawn(&config.callback_thread)?;
    let manager = ChannelManager::new(io_thread.runner());
    let ids = ChannelIdAllocator::new();

    // Keep the remote ends open for the lifetime of the demo.
    let mut peers = Vec::with_capacity(args.channels);
    let mut opened = Vec::with_capacity(args.channels);
    let (created_tx, created_rx) = mpsc::channel();

    for _ in 0..args.channels {
        let (local, remote) = PlatformHandle::pair()?;
        peers.push(remote);

        let channel_id = ids.allocate();
        let created_tx = created_tx.clone();
        let dispatcher = manager.create_channel_with_callback(
            channel_id,
            local,
            move || {
                let _ = created_tx.send(channel_id);
            },
            Some(callback_thread.runner()),
        );
        dispatcher.write_message(format!("hello from channel {channel_id}").into_bytes())?;
        opened.push((channel_id, dispatcher));
    }

    for _ in 0..args.channels {
        let channel_id = created_rx
            .recv_timeout(CALLBACK_TIMEOUT)
            .context("timed out waiting for channel creation")?;
        let channel = manager.get_channel(channel_id);
        info!(%channel_id, state = %channel.state(), "channel registered");
    }

    for (channel_id, dispatcher) in &opened {
        info!(
            %channel_id,
            attached = dispatcher.is_attached(),
            "bootstrap pipe ready"
        );
    }

    if let Some((first, _)) = opened.first() {
        let (closed_tx, closed_rx) = mpsc::channel();
        manager.shutdown_channel(
            *first,
            move || {
                let _ = closed_tx.send(());
            },
            Some(callback_thread.runner()),
        );
        closed_rx
            .recv_timeout(CALLBACK_TIMEOUT)
            .context("timed out waiting for channel shutdown")?;
        info!(channel_id = %first, "channel shut down individually");
    }

    let (done_tx, done_rx) = mpsc::channel();
    manager.shutdown(
        move || {
            let _ = done_tx.send(());
        },
        Some(callback_thread.runner()),
    );
    done_rx
        .recv_timeout(CALLBACK_TIMEOUT)
        .context("timed out waiting for manager shutdown")?;

    let closed = opened
        .iter()
        .filter(|(_, dispatcher)| dispatcher.is_peer_closed())
        .count();
    info!(closed, total = opened.len(), "all channels shut down");
    if closed != opened.len() {
        return Err(anyhow!("{} bootstrap pipes still open", opened.len() - closed));
    }

    drop(manager);
    io_thread.stop()?;
    callback_thread.stop()?;
    drop(peers);

    info!("hyprstream-channels finished");
    Ok(())
}
