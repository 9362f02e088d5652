//! Device position seam.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use vendmap_core::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix that may be returned. Zero forces a fresh fix.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters, when the source reports one.
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable")]
    PositionUnavailable,

    #[error("location request timeout")]
    Timeout,

    #[error("geolocation is not supported")]
    Unsupported,

    #[error("unknown location error")]
    Unknown,
}

impl PositionError {
    /// Classify a platform geolocation error code.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => PositionError::PermissionDenied,
            2 => PositionError::PositionUnavailable,
            3 => PositionError::Timeout,
            _ => PositionError::Unknown,
        }
    }
}

/// Continuous position updates. Dropping the watch stops it.
#[derive(Debug)]
pub struct PositionWatch {
    updates: mpsc::UnboundedReceiver<Result<Position, PositionError>>,
}

impl PositionWatch {
    /// Create a watch together with the sender a source pushes fixes into.
    #[must_use]
    pub fn channel() -> (
        mpsc::UnboundedSender<Result<Position, PositionError>>,
        PositionWatch,
    ) {
        let (tx, updates) = mpsc::unbounded_channel();
        (tx, PositionWatch { updates })
    }

    /// Next fix or failure, or `None` once the source stops.
    pub async fn next(&mut self) -> Option<Result<Position, PositionError>> {
        self.updates.recv().await
    }
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self, options: &PositionOptions) -> Result<Position, PositionError>;

    /// # Errors
    ///
    /// Fails up front only when watching is impossible (for example
    /// [`PositionError::Unsupported`]); per-fix failures arrive on the watch.
    async fn watch_position(&self, options: &PositionOptions)
        -> Result<PositionWatch, PositionError>;
}

/// Source that always reports the same outcome. Used where no positioning
/// hardware exists, such as the command line.
#[derive(Debug, Clone)]
pub struct FixedPositionSource {
    outcome: Result<(Coordinate, Option<f64>), PositionError>,
}

impl FixedPositionSource {
    #[must_use]
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            outcome: Ok((coordinate, None)),
        }
    }

    #[must_use]
    pub fn with_accuracy(coordinate: Coordinate, accuracy_m: f64) -> Self {
        Self {
            outcome: Ok((coordinate, Some(accuracy_m))),
        }
    }

    #[must_use]
    pub fn failing(err: PositionError) -> Self {
        Self { outcome: Err(err) }
    }

    #[must_use]
    pub fn unsupported() -> Self {
        Self::failing(PositionError::Unsupported)
    }

    fn fix(&self) -> Result<Position, PositionError> {
        self.outcome.map(|(coordinate, accuracy_m)| Position {
            coordinate,
            accuracy_m,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Position, PositionError> {
        self.fix()
    }

    async fn watch_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<PositionWatch, PositionError> {
        if self.outcome == Err(PositionError::Unsupported) {
            return Err(PositionError::Unsupported);
        }
        let (tx, watch) = PositionWatch::channel();
        let _ = tx.send(self.fix());
        Ok(watch)
    }
}
