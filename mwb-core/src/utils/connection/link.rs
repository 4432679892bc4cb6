//! CRC-checked serial link with a liveness watchdog.
//!
//! The link is split along its two execution contexts:
//!
//! - [`Uplink`] runs from the base tick. It seals and sends outgoing frames
//!   and advances the watchdog.
//! - [`Downlink`] runs from the receive-complete notification. It validates
//!   incoming frames and hands payloads to a [`PayloadSink`].
//!
//! Both halves share one [`LinkState`] holding the liveness flag and the error
//! counter as atomics.

use core::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use serde::{Deserialize, Serialize};

use super::frame::{self, FrameError, FRAME_OVERHEAD, MAX_FRAME_LEN, PAYLOAD_OFFSET};
use crate::utils::scheduler::Decimator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Frame magic, sent little-endian.
    pub head: u32,
    pub tx_len: usize,
    pub rx_len: usize,
    /// Watchdog window in base ticks.
    pub watchdog_period: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            head: 0x2025_0301,
            tx_len: 22,
            rx_len: 19,
            watchdog_period: 100,
        }
    }
}

impl LinkConfig {
    /// Copy with both frame lengths clamped into `[FRAME_OVERHEAD, MAX_FRAME_LEN]`.
    pub fn clamped(self) -> Self {
        Self {
            tx_len: self.tx_len.clamp(FRAME_OVERHEAD, MAX_FRAME_LEN),
            rx_len: self.rx_len.clamp(FRAME_OVERHEAD, MAX_FRAME_LEN),
            ..self
        }
    }
}

/// Flags shared between the send and receive halves.
#[derive(Debug, Default)]
pub struct LinkState {
    alive: AtomicBool,
    errors: AtomicU32,
}

impl LinkState {
    pub const fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            errors: AtomicU32::new(0),
        }
    }

    /// Frames discarded for length, head or CRC since start-up.
    pub fn error_count(&self) -> u32 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Whether any frame arrived in the current watchdog window.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Line faults reported by the transport's error notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Parity,
    Noise,
    Framing,
    Overrun,
}

impl fmt::Display for TransportError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Self::Parity => "parity error",
            Self::Noise => "noise error",
            Self::Framing => "framing error",
            Self::Overrun => "overrun error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    UnknownPacket(u8),
    Malformed,
}

impl fmt::Display for PayloadError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::UnknownPacket(t) => write!(f, "unknown packet type {t:#04x}"),
            Self::Malformed => write!(f, "malformed payload"),
        }
    }
}

#[derive(Debug)]
pub enum LinkSendError<E> {
    Payload(PayloadError),
    Frame(FrameError),
    Transport(E),
}

/// Byte transport used to emit sealed frames.
pub trait Transport {
    type Error: fmt::Debug;

    fn send(
        &mut self,
        frame: &[u8],
    ) -> Result<(), Self::Error>;
}

/// Fills the payload region of an outgoing frame.
pub trait PayloadSource {
    /// Context handed through from [`Uplink::send`].
    type Param;

    fn fill(
        &mut self,
        packet_type: u8,
        param: &Self::Param,
        payload: &mut [u8],
    ) -> Result<(), PayloadError>;
}

/// Consumes the payload of a validated incoming frame.
pub trait PayloadSink {
    fn handle(
        &mut self,
        packet_type: u8,
        payload: &[u8],
    ) -> Result<(), PayloadError>;
}

/// Invoked once per watchdog window without any received frame.
pub trait OfflineHandler {
    fn on_offline(&mut self);
}

/// Base-tick half of the link.
pub struct Uplink<'a, T, S, H> {
    config: LinkConfig,
    state: &'a LinkState,
    transport: T,
    source: S,
    offline: H,
    tx: [u8; MAX_FRAME_LEN],
    watchdog: Decimator,
    online: bool,
}

impl<'a, T, S, H> Uplink<'a, T, S, H>
where
    T: Transport,
    S: PayloadSource,
    H: OfflineHandler,
{
    pub fn new(
        config: LinkConfig,
        state: &'a LinkState,
        transport: T,
        source: S,
        offline: H,
    ) -> Self {
        let config = config.clamped();
        let mut tx = [0u8; MAX_FRAME_LEN];
        frame::write_head(&mut tx, config.head);

        Self {
            watchdog: Decimator::new(config.watchdog_period),
            config,
            state,
            transport,
            source,
            offline,
            tx,
            online: false,
        }
    }

    /// Fill, seal and transmit one frame of `packet_type`.
    pub fn send(
        &mut self,
        packet_type: u8,
        param: &S::Param,
    ) -> Result<(), LinkSendError<T::Error>> {
        let len = self.config.tx_len;
        let buf = &mut self.tx[..len];

        let payload = &mut buf[PAYLOAD_OFFSET..len - 1];
        payload.fill(0);
        self.source
            .fill(packet_type, param, payload)
            .map_err(LinkSendError::Payload)?;

        frame::seal(buf, self.config.head, packet_type).map_err(LinkSendError::Frame)?;
        self.transport.send(buf).map_err(LinkSendError::Transport)
    }

    /// Advance the watchdog by one base tick.
    ///
    /// Returns `true` when a window closed without traffic and the offline
    /// handler ran.
    pub fn watchdog(&mut self) -> bool {
        if !self.watchdog.tick() {
            return false;
        }

        if self.state.take_alive() {
            if !self.online {
                tracing::info!("link online");
                self.online = true;
            }
            false
        } else {
            if self.online {
                tracing::info!(errors = self.state.error_count(), "link offline");
                self.online = false;
            }
            self.offline.on_offline();
            true
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> &'a LinkState {
        self.state
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Receive half of the link.
pub struct Downlink<'a, K> {
    config: LinkConfig,
    state: &'a LinkState,
    sink: K,
    rx: [u8; MAX_FRAME_LEN],
}

impl<'a, K: PayloadSink> Downlink<'a, K> {
    pub fn new(
        config: LinkConfig,
        state: &'a LinkState,
        sink: K,
    ) -> Self {
        Self {
            config: config.clamped(),
            state,
            sink,
            rx: [0u8; MAX_FRAME_LEN],
        }
    }

    /// Process one receive-complete notification.
    ///
    /// Any arrival counts as liveness, valid or not. Frames failing the
    /// length, head or CRC check bump the error counter and are dropped.
    pub fn receive(
        &mut self,
        bytes: &[u8],
    ) -> Result<(), FrameError> {
        self.state.mark_alive();

        let len = self.config.rx_len;
        if bytes.len() != len {
            return Err(self.reject(FrameError::LengthMismatch {
                expected: len,
                actual: bytes.len(),
            }));
        }

        self.rx[..len].copy_from_slice(bytes);
        let (packet_type, payload) = match frame::validate(&self.rx[..len], self.config.head) {
            Ok(v) => v,
            Err(e) => return Err(self.reject(e)),
        };

        if let Err(e) = self.sink.handle(packet_type, payload) {
            tracing::debug!(packet_type, error = %e, "payload ignored");
        }
        Ok(())
    }

    /// Transport error notification; logged, reception continues.
    pub fn on_transport_error(
        &mut self,
        error: TransportError,
    ) {
        tracing::warn!(%error, "serial transport error");
    }

    fn reject(
        &self,
        error: FrameError,
    ) -> FrameError {
        self.state.record_error();
        tracing::debug!(%error, "frame discarded");
        error
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> &'a LinkState {
        self.state
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }
}
