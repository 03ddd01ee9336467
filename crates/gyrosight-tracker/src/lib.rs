pub mod projection;
pub mod ring;
pub mod tracker;

pub use projection::{reproject, CameraBasis, CameraModel};
pub use ring::{FrameRing, MAX_TRACK_FRAMES};
pub use tracker::{PoiTracker, PointOfInterest, TrackedFrame};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("video source has no new frame")]
    NoFrame,
    #[error("frame capture failed")]
    Capture(#[source] anyhow::Error),
    #[error("frame rendering failed")]
    Render(#[source] anyhow::Error),
    #[error("point is not in front of the camera")]
    DegenerateProjection,
    #[error("frame rotation is not invertible")]
    DegenerateRotation,
    #[error("camera forward and right must be non-zero and not parallel")]
    DegenerateBasis,
    #[error("capture thread is already running")]
    AlreadyRunning,
    #[error("failed to spawn capture thread")]
    Spawn(#[source] std::io::Error),
}
