//! Asynchronous client for the NatNet motion-capture streaming protocol.
//!
//! The crate decodes the binary UDP stream of a NatNet server (OptiTrack Motive
//! and compatibles) into owned value types and hands them to registered
//! receivers.
//!
//! # Features
//!
//! - **Version-aware decoding**: NatNet 1.x and 2.x layouts, gated by the version
//!   the server reports during the handshake
//! - **Resilient receive loop**: malformed datagrams are dropped and counted, the
//!   stream continues
//! - **No background tasks**: one future drives both channels on the caller's runtime
//! - **Stream subscriptions**: latest-value frame streams with optional rate limiting
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use natnet::{ClientConfig, NatNet, UpdateRate};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> natnet::Result<()> {
//!     let (mut client, subscription) = NatNet::subscribe(ClientConfig::default()).await?;
//!     let mut frames = subscription.frames(UpdateRate::Max(30));
//!
//!     let printer = async {
//!         while let Some(frame) = frames.next().await {
//!             for body in &frame.rigid_bodies {
//!                 println!("{} {:?}", body.id, body.position);
//!             }
//!         }
//!     };
//!     tokio::join!(client.run(), printer);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire format
pub mod decode;
pub mod packet;

// Session and networking
pub mod client;
pub mod config;
pub mod receiver;
pub mod session;
pub mod stream;
pub mod transport;

pub use error::*;
pub use types::*;

pub use client::{ClientHandle, ClientStats, ClientStatus, NatNetClient};
pub use config::ClientConfig;
pub use receiver::{FrameReceiver, FrameSubscription, ReceiverSet, WatchReceiver};
pub use session::{ProtocolSession, SessionEvent};
pub use transport::{Channel, ChannelState};

/// Entry point for NatNet connections.
///
/// # Examples
///
/// ```rust,no_run
/// use natnet::{ClientConfig, NatNet};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> natnet::Result<()> {
/// let config = ClientConfig::load("natnet.yaml")?;
/// let mut client = NatNet::connect(config).await?;
/// client.run().await;
/// # Ok(())
/// # }
/// ```
pub struct NatNet;

impl NatNet {
    /// Bind both channels and send the connection request.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The server address cannot be resolved
    /// - A socket cannot be bound or the multicast group cannot be joined
    pub async fn connect(config: ClientConfig) -> Result<NatNetClient> {
        NatNetClient::connect(config).await
    }

    /// Connect and register a [`WatchReceiver`], returning its subscription.
    pub async fn subscribe(config: ClientConfig) -> Result<(NatNetClient, FrameSubscription)> {
        let mut client = NatNetClient::connect(config).await?;
        let (receiver, subscription) = WatchReceiver::new();
        client.add_receiver(receiver);
        Ok((client, subscription))
    }
}
