use crate::projection::{reproject, CameraBasis, CameraModel};
use crate::ring::{FrameRing, MAX_TRACK_FRAMES};
use crate::TrackerError;
use glam::{Mat3, Vec2, Vec3};
use gyrosight_capture::{CapturedFrame, FrameRenderer, Marker, VideoSource};
use gyrosight_imu::OrientationSource;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Frames between the two samples `video_fps` compares.
const FPS_WINDOW: usize = 16;

/// Sleep when the video source has nothing new.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Tracked screen-space target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointOfInterest {
    /// Pixel coordinates.
    pub position: Vec2,
    /// Marker radius in pixels.
    pub radius: f32,
}

/// One captured frame with the orientation it was taken at.
#[derive(Debug)]
pub struct TrackedFrame {
    pub image: CapturedFrame,
    /// Engine rotation at capture time (a copy).
    pub rotation: Mat3,
    pub basis: CameraBasis,
    pub captured_at: Instant,
    pub point_of_interest: Option<PointOfInterest>,
}

impl TrackedFrame {
    /// Time between `earlier` and this frame.
    pub fn elapsed_since(&self, earlier: &TrackedFrame) -> Duration {
        self.captured_at.saturating_duration_since(earlier.captured_at)
    }
}

struct TrackerState {
    ring: FrameRing<Arc<TrackedFrame>>,
    basis: CameraBasis,
    /// Current target, in the coordinates of the newest frame.
    target: Option<PointOfInterest>,
}

struct TrackerShared {
    camera: CameraModel,
    orientation: Arc<dyn OrientationSource>,
    source: Mutex<Box<dyn VideoSource>>,
    state: Mutex<TrackerState>,
}

struct CaptureWorker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

/// Keeps a screen-space point anchored to the world using measured rotation.
///
/// Every captured frame is stored with the engine's rotation and the camera
/// basis at capture time. When a point of interest is active it is carried
/// from the previous frame into the new one by rotating its viewing ray.
pub struct PoiTracker {
    shared: Arc<TrackerShared>,
    worker: Option<CaptureWorker>,
}

impl PoiTracker {
    pub fn new(
        camera: CameraModel,
        orientation: Arc<dyn OrientationSource>,
        source: Box<dyn VideoSource>,
    ) -> Self {
        let (width, height) = source.dimensions();
        if (width, height) != (camera.width, camera.height) {
            warn!(
                source_width = width,
                source_height = height,
                camera_width = camera.width,
                camera_height = camera.height,
                "Video source size differs from camera model"
            );
        }
        Self {
            shared: Arc::new(TrackerShared {
                camera,
                orientation,
                source: Mutex::new(source),
                state: Mutex::new(TrackerState {
                    ring: FrameRing::new(MAX_TRACK_FRAMES),
                    basis: CameraBasis::default(),
                    target: None,
                }),
            }),
            worker: None,
        }
    }

    pub fn camera(&self) -> &CameraModel {
        &self.shared.camera
    }

    /// Set the camera's optical axis and horizontal axis in gyro space.
    /// Applies to frames captured afterwards.
    pub fn set_camera_direction_in_gyro_space(&self, forward: Vec3, right: Vec3) -> Result<(), TrackerError> {
        let basis = CameraBasis::new(forward, right)?;
        self.shared.state.lock().basis = basis;
        debug!(?basis, "Camera basis updated");
        Ok(())
    }

    pub fn camera_basis(&self) -> CameraBasis {
        self.shared.state.lock().basis
    }

    /// Start tracking `position` (pixels, in the newest frame), replacing
    /// any previous target.
    pub fn set_point_of_interest(&self, position: Vec2, radius: f32) {
        let mut state = self.shared.state.lock();
        state.target = Some(PointOfInterest { position, radius });
        info!(x = position.x, y = position.y, radius, "Point of interest set");
    }

    pub fn clear_point_of_interest(&self) {
        self.shared.state.lock().target = None;
    }

    /// Where the target is in the newest frame, if tracking.
    pub fn point_of_interest(&self) -> Option<PointOfInterest> {
        self.shared.state.lock().target
    }

    /// Capture one frame and store it as the newest.
    pub fn add_frame(&self) -> Result<Arc<TrackedFrame>, TrackerError> {
        self.shared.add_frame()
    }

    /// Frame `age` captures before the newest (0 = newest).
    pub fn get_frame(&self, age: usize) -> Option<Arc<TrackedFrame>> {
        self.shared.state.lock().ring.get(age).cloned()
    }

    /// Frames currently retained.
    pub fn frame_count(&self) -> usize {
        self.shared.state.lock().ring.len()
    }

    /// Capture throughput over the last `FPS_WINDOW` frames; 0 until enough
    /// frames exist.
    pub fn video_fps(&self) -> f32 {
        let (Some(newest), Some(oldest)) = (self.get_frame(0), self.get_frame(FPS_WINDOW)) else {
            return 0.0;
        };
        let elapsed = newest.elapsed_since(&oldest).as_secs_f32();
        if elapsed > 0.0 {
            FPS_WINDOW as f32 / elapsed
        } else {
            0.0
        }
    }

    /// Render the newest frame with the point-of-interest marker.
    pub fn draw(&self, renderer: &mut dyn FrameRenderer) -> Result<(), TrackerError> {
        let frame = self.get_frame(0).ok_or(TrackerError::NoFrame)?;
        let marker = frame.point_of_interest.map(|poi| Marker {
            center: poi.position,
            radius: poi.radius,
        });
        renderer.render(&frame.image, marker).map_err(TrackerError::Render)
    }

    pub fn image_to_cam(&self, point: Vec2) -> Vec3 {
        self.shared.camera.image_to_cam(point)
    }

    pub fn cam_to_gyro(&self, v: Vec3) -> Vec3 {
        self.camera_basis().cam_to_gyro(v)
    }

    pub fn gyro_to_cam(&self, v: Vec3) -> Vec3 {
        self.camera_basis().gyro_to_cam(v)
    }

    pub fn cam_to_image(&self, ray: Vec3) -> Result<Vec2, TrackerError> {
        self.shared.camera.cam_to_image(ray)
    }

    /// Run `add_frame` continuously on a background thread.
    pub fn start(&mut self) -> Result<(), TrackerError> {
        if self.worker.is_some() {
            return Err(TrackerError::AlreadyRunning);
        }
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = stop.clone();
        let shared = self.shared.clone();

        let handle = std::thread::Builder::new()
            .name("gyrosight-capture".into())
            .spawn(move || capture_loop(shared, loop_stop))
            .map_err(TrackerError::Spawn)?;

        self.worker = Some(CaptureWorker { handle, stop });
        info!("Frame capture started");
        Ok(())
    }

    /// Stop the capture thread. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop.store(true, Ordering::Release);
        if worker.handle.join().is_err() {
            tracing::error!("Capture thread panicked");
        } else {
            info!("Frame capture stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for PoiTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl TrackerShared {
    fn add_frame(&self) -> Result<Arc<TrackedFrame>, TrackerError> {
        // Capture blocks on the device; keep it outside the state lock.
        let image = self
            .source
            .lock()
            .try_capture()
            .map_err(TrackerError::Capture)?
            .ok_or(TrackerError::NoFrame)?;
        let captured_at = Instant::now();
        let rotation = self
            .orientation
            .transform_at(-self.camera.video_latency.as_secs_f32());

        let mut state = self.state.lock();
        let basis = state.basis;
        let point_of_interest = match (state.target, state.ring.get(0)) {
            (None, _) => None,
            // The target is expressed in the previous frame once that frame
            // carried a point record; otherwise it is taken as is.
            (Some(target), Some(previous)) if previous.point_of_interest.is_some() => {
                match reproject(
                    &self.camera,
                    target.position,
                    previous.rotation,
                    &previous.basis,
                    rotation,
                    &basis,
                ) {
                    Ok(position) => Some(PointOfInterest { position, ..target }),
                    Err(e) => {
                        warn!(?e, "Point of interest lost");
                        None
                    }
                }
            }
            (Some(target), _) => Some(target),
        };

        state.target = point_of_interest;
        let frame = Arc::new(TrackedFrame {
            image,
            rotation,
            basis,
            captured_at,
            point_of_interest,
        });
        state.ring.push(frame.clone());
        Ok(frame)
    }
}

fn capture_loop(shared: Arc<TrackerShared>, stop: Arc<AtomicBool>) {
    let mut frames: u64 = 0;
    while !stop.load(Ordering::Acquire) {
        match shared.add_frame() {
            Ok(_) => {
                frames += 1;
                if frames % 100 == 0 {
                    debug!(frames, "Frames captured");
                }
            }
            Err(TrackerError::NoFrame) => std::thread::sleep(IDLE_SLEEP),
            Err(e) => {
                trace!(?e, "Skipping failed capture");
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }
    debug!(frames, "Capture thread exiting");
}
