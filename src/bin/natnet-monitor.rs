//! NatNet stream monitor
//!
//! Connects to a server, logs the handshake and model definitions, and prints a
//! summary line every `--every` frames.
//!
//! Usage: `natnet-monitor [config.yaml] [--every N]`

use anyhow::{Context, bail};
use natnet::{Channel, ChannelState, ClientConfig, FrameReceiver, FrameSnapshot, ModelDefinition, NatNet};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_EVERY: u64 = 100;

struct LogReceiver {
    every: u64,
    seen: u64,
}

impl FrameReceiver for LogReceiver {
    fn on_model_definition(&mut self, model: &ModelDefinition) {
        info!(
            point_clouds = model.point_clouds.len(),
            rigid_bodies = model.rigid_bodies.len(),
            skeletons = model.skeletons.len(),
            "Model definition"
        );
        for body in &model.rigid_bodies {
            info!(id = body.id, name = %body.name, parent = body.parent_id, "  rigid body");
        }
        for skeleton in &model.skeletons {
            info!(id = skeleton.id, name = %skeleton.name, bones = skeleton.rigid_bodies.len(), "  skeleton");
        }
    }

    fn on_frame_snapshot(&mut self, frame: &FrameSnapshot) {
        self.seen += 1;
        if self.seen % self.every != 0 {
            return;
        }
        let tracked = frame.rigid_bodies.iter().filter(|b| b.tracking_valid != Some(false)).count();
        info!(
            frame = frame.frame_number,
            rigid_bodies = frame.rigid_bodies.len(),
            tracked,
            skeletons = frame.skeletons.len(),
            markers = frame.tracked_markers().count(),
            unidentified = frame.other_markers.len(),
            latency_ms = frame.latency * 1000.0,
            "Frame"
        );
    }

    fn on_connection_status(&mut self, channel: Channel, state: ChannelState) {
        if state == ChannelState::Closed {
            warn!(%channel, "Channel closed");
        } else {
            info!(%channel, ?state, "Channel status");
        }
    }
}

fn parse_args() -> anyhow::Result<(Option<String>, u64)> {
    let mut config = None;
    let mut every = DEFAULT_EVERY;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--every" => {
                let value = args.next().context("--every needs a value")?;
                every = value.parse().with_context(|| format!("invalid frame count {}", value))?;
                if every == 0 {
                    bail!("--every must be at least 1");
                }
            }
            path if config.is_none() => config = Some(path.to_string()),
            other => bail!("unexpected argument {}", other),
        }
    }
    Ok((config, every))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config_path, every) = parse_args()?;
    let config = match config_path {
        Some(path) => ClientConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => ClientConfig::default(),
    };

    let mut client = NatNet::connect(config).await.context("connecting to NatNet server")?;
    client.add_receiver(LogReceiver { every, seen: 0 });

    let cancel = client.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            cancel.cancel();
        }
    });

    client.run().await;

    let stats = client.stats();
    info!(
        datagrams = stats.datagrams,
        frames = stats.frames,
        malformed = stats.malformed,
        dropped_before_handshake = stats.dropped_before_handshake,
        out_of_order = stats.out_of_order,
        "Done"
    );
    Ok(())
}
