//! Device control contract.

use crate::geometry::Point;
use crate::recognition::Frame;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`Controller`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// No connection to the device has been established.
    #[error("Device not connected")]
    NotConnected,

    /// Connecting to the device failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The screen could not be captured.
    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    /// An input command was rejected by the transport.
    #[error("Input rejected: {0}")]
    InputRejected(String),
}

/// Result type for device control operations.
pub type ControlResult<T> = std::result::Result<T, ControlError>;

/// Device collaborator: captures the screen and injects input.
///
/// Both the execution cycle and the external-call handler use the same
/// controller, so implementations serialize their own transport access.
pub trait Controller: Send + Sync {
    /// Establishes the connection to the device.
    fn connect(&self) -> ControlResult<()>;

    /// Whether a connection is currently established.
    fn connected(&self) -> bool;

    /// Captures the current screen.
    fn screencap(&self) -> ControlResult<Frame>;

    /// Taps a point.
    fn click(&self, point: Point) -> ControlResult<()>;

    /// Swipes between two points over `duration`.
    fn swipe(&self, from: Point, to: Point, duration: Duration) -> ControlResult<()>;
}
