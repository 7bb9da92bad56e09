//! Simulated platform sources.
//!
//! Deterministic implementations of the platform seams, used by the
//! crate's own tests and by demo hosts that run without real sensors.
//! Real hosts implement the traits in [`crate::permission`] against
//! their platform instead. Everything here assumes the engine's
//! single-threaded event model.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::geo::GeoPoint;
use crate::permission::{
    CameraAccess, CameraConstraints, CameraError, CameraStream, FullscreenControl,
    LocationAccess, LocationError, LocationOptions, OrientationAccess, OrientationError,
};

/// Scriptable camera device.
pub struct SimCamera {
    failure: Option<CameraError>,
    reject_constraints: bool,
    attempts: usize,
    live: Rc<Cell<usize>>,
}

impl SimCamera {
    /// A camera that grants any request.
    pub fn new() -> Self {
        Self {
            failure: None,
            reject_constraints: false,
            attempts: 0,
            live: Rc::new(Cell::new(0)),
        }
    }

    /// A camera that fails every request with the given error.
    pub fn failing(failure: CameraError) -> Self {
        Self { failure: Some(failure), ..Self::new() }
    }

    /// A camera that rejects any request carrying a facing preference
    /// or resolution hint, accepting only a bare request.
    pub fn rejecting_constraints() -> Self {
        Self { reject_constraints: true, ..Self::new() }
    }

    /// Number of open calls seen so far.
    pub fn open_attempts(&self) -> usize {
        self.attempts
    }

    /// Number of streams currently live (opened and not stopped).
    pub fn live_streams(&self) -> usize {
        self.live.get()
    }

    /// Shared live-stream counter, for asserting release behavior
    /// after the camera has been moved into a session.
    pub fn stream_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.live)
    }
}

impl Default for SimCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraAccess for SimCamera {
    fn open(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, CameraError> {
        self.attempts += 1;
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        if self.reject_constraints
            && (constraints.facing.is_some() || constraints.resolution.is_some())
        {
            return Err(CameraError::Overconstrained);
        }
        self.live.set(self.live.get() + 1);
        Ok(Box::new(SimCameraStream {
            active: true,
            live: Rc::clone(&self.live),
        }))
    }
}

struct SimCameraStream {
    active: bool,
    live: Rc<Cell<usize>>,
}

impl CameraStream for SimCameraStream {
    fn stop(&mut self) {
        if self.active {
            self.active = false;
            self.live.set(self.live.get() - 1);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Orientation source with an optional consent gate.
pub struct SimOrientation {
    gated: bool,
    grant: bool,
    prompts: usize,
}

impl SimOrientation {
    /// A platform that delivers orientation events without consent.
    pub fn ungated() -> Self {
        Self { gated: false, grant: true, prompts: 0 }
    }

    /// A consent-gated platform that grants or denies the prompt.
    pub fn gated(grant: bool) -> Self {
        Self { gated: true, grant, prompts: 0 }
    }

    /// Number of consent prompts shown so far.
    pub fn prompts(&self) -> usize {
        self.prompts
    }
}

impl OrientationAccess for SimOrientation {
    fn requires_consent(&self) -> bool {
        self.gated
    }

    fn request_consent(&mut self) -> Result<(), OrientationError> {
        self.prompts += 1;
        if self.grant {
            Ok(())
        } else {
            Err(OrientationError::ConsentDenied)
        }
    }
}

/// Location source that replays a scripted fix sequence.
///
/// Each fetch pops the next entry; after the script runs out the last
/// successful fix is repeated. An empty source times out.
pub struct SimLocation {
    queue: VecDeque<Result<GeoPoint, LocationError>>,
    last_fix: Option<GeoPoint>,
}

impl SimLocation {
    /// A source with no fix at all: every fetch times out.
    pub fn empty() -> Self {
        Self { queue: VecDeque::new(), last_fix: None }
    }

    /// A source that always returns the same fix.
    pub fn fixed(point: GeoPoint) -> Self {
        Self { queue: VecDeque::new(), last_fix: Some(point) }
    }

    /// A source that replays the given fixes in order.
    pub fn scripted<I: IntoIterator<Item = GeoPoint>>(fixes: I) -> Self {
        Self {
            queue: fixes.into_iter().map(Ok).collect(),
            last_fix: None,
        }
    }

    /// A source whose first fetch fails with the given error.
    pub fn failing(error: LocationError) -> Self {
        Self {
            queue: VecDeque::from([Err(error)]),
            last_fix: None,
        }
    }

    /// Append a fix to the script.
    pub fn push_fix(&mut self, point: GeoPoint) {
        self.queue.push_back(Ok(point));
    }
}

impl LocationAccess for SimLocation {
    fn fetch(&mut self, _options: &LocationOptions) -> Result<GeoPoint, LocationError> {
        match self.queue.pop_front() {
            Some(Ok(point)) => {
                self.last_fix = Some(point);
                Ok(point)
            }
            Some(Err(err)) => Err(err),
            None => self.last_fix.ok_or(LocationError::Timeout),
        }
    }
}

/// Fullscreen control that tracks state in memory.
pub struct SimFullscreen {
    supported: bool,
    active: bool,
}

impl SimFullscreen {
    pub fn new(supported: bool) -> Self {
        Self { supported, active: false }
    }
}

impl FullscreenControl for SimFullscreen {
    fn supported(&self) -> bool {
        self.supported
    }

    fn enter(&mut self) -> bool {
        if self.supported {
            self.active = true;
        }
        self.active
    }

    fn exit(&mut self) {
        self.active = false;
    }

    fn is_fullscreen(&self) -> bool {
        self.active
    }
}
