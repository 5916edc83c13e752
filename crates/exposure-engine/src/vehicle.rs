//! Per-vehicle exposure: one tagger and one evaluator per vehicle, with an
//! airstream and a sun target refreshed every tick.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::mpsc::{self, Receiver, Sender};

use glam::{Mat4, Vec3};

use crate::config::ExposureConfig;
use crate::debug::DebugVisualizer;
use crate::error::ExposureError;
use crate::evaluator::{Evaluator, RenderRequest, RenderResult, TargetId};
use crate::geometry::Bounds;
use crate::scene::{ObjectTagger, Surface};

pub const AIRSTREAM: TargetId = TargetId(0);
pub const SUN: TargetId = TargetId(1);

/// Below this density the vehicle is considered out of the atmosphere.
pub const MIN_ATMOSPHERE_DENSITY: f64 = 1e-10;

/// Below this speed the airstream is assumed to come from straight ahead.
const MIN_AIRSPEED: f32 = 0.001;

/// Inputs sampled once per tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlightState {
    /// Velocity relative to the surrounding air, world space.
    pub velocity: Vec3,
    /// kg/m^3.
    pub atmosphere_density: f64,
    /// Sun position in world space, `None` when there is no sun.
    pub sun_position: Option<Vec3>,
    /// Vehicle-local to world transform.
    pub local_to_world: Mat4,
}

impl Default for FlightState {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            atmosphere_density: 0.0,
            sun_position: None,
            local_to_world: Mat4::IDENTITY,
        }
    }
}

impl FlightState {
    #[inline]
    pub fn in_atmosphere(&self) -> bool {
        self.atmosphere_density > MIN_ATMOSPHERE_DENSITY
    }
}

/// Exposure evaluation owned by a single vehicle.
///
/// Parts are registered in vehicle-local space; flight inputs are converted
/// into that space before each request. A target is only resubmitted once its
/// previous evaluation has been delivered, so slow readbacks are never starved
/// by newer requests.
pub struct VehicleExposure<K> {
    config: ExposureConfig,
    tagger: ObjectTagger<K>,
    evaluator: Evaluator<K>,
    bounds: Bounds,

    results_tx: Sender<RenderResult<K>>,
    results_rx: Receiver<RenderResult<K>>,
    latest: HashMap<TargetId, RenderResult<K>>,
}

impl<K> VehicleExposure<K>
where
    K: Clone + Eq + Hash + fmt::Display + 'static,
{
    pub fn new(config: ExposureConfig, evaluator: Evaluator<K>) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        Self {
            config,
            tagger: ObjectTagger::new(),
            evaluator,
            bounds: Bounds::default(),
            results_tx,
            results_rx,
            latest: HashMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &ExposureConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ExposureConfig) {
        self.config = config;
    }

    #[inline]
    pub fn tagger(&self) -> &ObjectTagger<K> {
        &self.tagger
    }

    #[inline]
    pub fn evaluator(&self) -> &Evaluator<K> {
        &self.evaluator
    }

    #[inline]
    pub fn evaluator_mut(&mut self) -> &mut Evaluator<K> {
        &mut self.evaluator
    }

    /// Vehicle-local bounds framed by every request.
    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    /// Re-registers every part after a structural change and recomputes the
    /// vehicle bounds. Returns the parts left without a color.
    ///
    /// In-flight evaluations drew the old colors and are cancelled; results
    /// from before the change are forgotten.
    pub fn reset_parts<I, S>(&mut self, parts: I) -> Vec<K>
    where
        I: IntoIterator<Item = (K, S)>,
        S: IntoIterator<Item = Surface>,
    {
        self.evaluator.cancel_all();
        self.collect();
        self.latest.clear();
        self.tagger.reset();
        let mut exhausted = None;
        for (part, surfaces) in parts {
            if let Err(err @ ExposureError::CapacityExceeded { .. }) =
                self.tagger.setup_renderers(part, surfaces)
            {
                exhausted = Some(err);
            }
        }
        if let Some(err) = exhausted {
            log::warn!("{err}; {} parts will not be evaluated", self.tagger.rejected().len());
        }
        self.bounds = self.tagger.bounds().unwrap_or_default();
        log::debug!("vehicle parts reset: {}", self.tagger.describe());
        self.tagger.rejected().to_vec()
    }

    /// Shows debug output for `target` using the configured background color.
    pub fn enable_debug(&mut self, target: TargetId) {
        let debugger = DebugVisualizer::new().with_background(self.config.debug_background);
        self.evaluator.attach_debugger(target, debugger);
    }

    pub fn debugger(&self, target: TargetId) -> Option<&DebugVisualizer> {
        self.evaluator.debugger(target)
    }

    /// One tick: collects finished evaluations, then requests new ones for
    /// idle targets.
    pub fn update(&mut self, state: &FlightState) {
        self.evaluator.update(&self.tagger);
        self.collect();

        if self.tagger.count() == 0 {
            return;
        }

        let world_to_local = state.local_to_world.inverse();

        if self.config.airstream && state.in_atmosphere() {
            let velocity = world_to_local.transform_vector3(state.velocity);
            let forward = if state.velocity.length() < MIN_AIRSPEED {
                Vec3::Z
            } else {
                velocity.normalize_or_zero()
            };
            self.request(AIRSTREAM, -forward);
        } else {
            self.evaluator.cancel(AIRSTREAM);
            self.latest.remove(&AIRSTREAM);
        }

        match state.sun_position {
            Some(sun) if self.config.sun => {
                let from_sun = self.bounds.center - world_to_local.transform_point3(sun);
                self.request(SUN, from_sun.normalize_or_zero());
            }
            _ => {
                self.evaluator.cancel(SUN);
                self.latest.remove(&SUN);
            }
        }

        self.collect();
    }

    fn request(&mut self, target: TargetId, direction: Vec3) {
        if self.evaluator.is_pending(target) {
            return;
        }
        let request = RenderRequest::new(direction, self.bounds)
            .with_resolution(self.config.resolution())
            .with_device(self.config.device);
        let tx = self.results_tx.clone();
        self.evaluator.submit(target, request, &self.tagger, move |result| {
            let _ = tx.send(result);
        });
    }

    fn collect(&mut self) {
        while let Ok(result) = self.results_rx.try_recv() {
            self.latest.insert(result.target, result);
        }
    }

    pub fn latest(&self, target: TargetId) -> Option<&RenderResult<K>> {
        self.latest.get(&target)
    }

    pub fn airstream(&self) -> Option<&RenderResult<K>> {
        self.latest(AIRSTREAM)
    }

    pub fn sun(&self) -> Option<&RenderResult<K>> {
        self.latest(SUN)
    }

    /// Stops all evaluations and forgets results.
    pub fn shutdown(&mut self) {
        self.evaluator.cancel_all();
        self.latest.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::device::{DevicePreference, PhysicalDevice};
    use crate::evaluator::Outcome;
    use crate::reduce::{
        CpuReducer, PendingReduction, PixelReducer, ReducedFrame, Reduction, ReductionPoll,
    };
    use crate::render::{Frame, SoftwareRasterizer};
    use crate::scene::Mesh;

    fn config() -> ExposureConfig {
        ExposureConfig {
            device: DevicePreference::Cpu,
            width: 32,
            height: 32,
            ..ExposureConfig::default()
        }
    }

    fn vehicle() -> VehicleExposure<&'static str> {
        let mut v = VehicleExposure::new(config(), Evaluator::software());
        let body = Arc::new(Mesh::cuboid(Vec3::new(-0.5, -0.5, -2.0), Vec3::new(0.5, 0.5, 2.0)));
        let wing = Arc::new(Mesh::cuboid(Vec3::new(-3.0, -0.05, -0.5), Vec3::new(3.0, 0.05, 0.5)));
        let rejected = v.reset_parts([
            ("body", vec![Surface::new(body, Mat4::IDENTITY)]),
            ("wing", vec![Surface::new(wing, Mat4::IDENTITY)]),
        ]);
        assert!(rejected.is_empty());
        v
    }

    fn flying(velocity: Vec3) -> FlightState {
        FlightState {
            velocity,
            atmosphere_density: 1.2,
            sun_position: Some(Vec3::new(0.0, 1000.0, 0.0)),
            local_to_world: Mat4::IDENTITY,
        }
    }

    #[test]
    fn bounds_cover_all_parts() {
        let v = vehicle();
        assert_eq!(v.bounds().min(), Vec3::new(-3.0, -0.5, -2.0));
        assert_eq!(v.bounds().max(), Vec3::new(3.0, 0.5, 2.0));
    }

    #[test]
    fn airstream_looks_against_velocity() {
        let mut v = vehicle();
        v.update(&flying(Vec3::new(0.0, 0.0, 50.0)));
        let r = v.airstream().unwrap();
        assert_eq!(r.outcome, Outcome::Measured);
        assert!((r.forward - Vec3::NEG_Z).length() < 1e-5);
        // Head-on: the body cross-section is 1 m2 and the wing leading edge 6 x 0.1.
        assert!(r.area_of(&"body") > 0.5);
        assert!(r.area_of(&"wing") > 0.0);
    }

    #[test]
    fn sun_overhead_sees_the_wing_planform() {
        let mut v = vehicle();
        v.update(&flying(Vec3::new(0.0, 0.0, 50.0)));
        let r = v.sun().unwrap();
        assert!((r.forward - Vec3::NEG_Y).length() < 1e-5);
        assert!(r.area_of(&"wing") > r.area_of(&"body"));
        assert!(r.total_area() <= r.frame_area() + 1e-9);
    }

    #[test]
    fn no_airstream_outside_atmosphere() {
        let mut v = vehicle();
        v.update(&flying(Vec3::Z));
        assert!(v.airstream().is_some());

        let mut state = flying(Vec3::Z);
        state.atmosphere_density = 0.0;
        v.update(&state);
        assert!(v.airstream().is_none());
        assert!(v.sun().is_some());
    }

    #[test]
    fn slow_vehicle_uses_default_heading() {
        let mut v = vehicle();
        v.update(&flying(Vec3::new(0.0, 0.0001, 0.0)));
        assert!((v.airstream().unwrap().forward - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn velocity_is_taken_into_vehicle_space() {
        let mut v = vehicle();
        let mut state = flying(Vec3::new(50.0, 0.0, 0.0));
        // Vehicle yawed so that its local +Z points along world +X.
        state.local_to_world = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        v.update(&state);
        assert!((v.airstream().unwrap().forward - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn disabled_targets_are_skipped() {
        let mut v = vehicle();
        v.set_config(ExposureConfig { sun: false, airstream: false, ..config() });
        v.update(&flying(Vec3::Z));
        assert!(v.airstream().is_none());
        assert!(v.sun().is_none());
    }

    // ── structural changes ────────────────────────────────────────────────

    struct GatedReadback {
        gate: Rc<Cell<bool>>,
        out: Option<ReducedFrame>,
    }

    impl PendingReduction for GatedReadback {
        fn poll(&mut self) -> ReductionPoll {
            if !self.gate.get() {
                return ReductionPoll::Pending;
            }
            match self.out.take() {
                Some(out) => ReductionPoll::Ready(out),
                None => ReductionPoll::Failed(ExposureError::DeviceFailure("consumed".into())),
            }
        }
    }

    struct GatedReducer {
        gate: Rc<Cell<bool>>,
    }

    impl PixelReducer for GatedReducer {
        fn device(&self) -> PhysicalDevice {
            PhysicalDevice::Gpu
        }

        fn reduce(
            &mut self,
            frame: &Frame,
            palette_len: u32,
            want_image: bool,
        ) -> Result<Reduction, ExposureError> {
            let image = frame.to_image()?;
            Ok(Reduction::Pending(Box::new(GatedReadback {
                gate: Rc::clone(&self.gate),
                out: Some(ReducedFrame {
                    histogram: CpuReducer::count(&image, palette_len),
                    image: want_image.then_some(image),
                }),
            })))
        }
    }

    fn gated_vehicle(gate: &Rc<Cell<bool>>) -> VehicleExposure<&'static str> {
        let evaluator = Evaluator::with_backends(
            Box::new(SoftwareRasterizer::new()),
            Some(Box::new(GatedReducer { gate: Rc::clone(gate) })),
        );
        let config = ExposureConfig {
            device: DevicePreference::Gpu,
            sun: false,
            ..config()
        };
        VehicleExposure::new(config, evaluator)
    }

    fn body() -> Vec<Surface> {
        let mesh = Arc::new(Mesh::cuboid(Vec3::splat(-1.0), Vec3::ONE));
        vec![Surface::new(mesh, Mat4::IDENTITY)]
    }

    #[test]
    fn reset_parts_drops_evaluations_of_old_colors() {
        let gate = Rc::new(Cell::new(false));
        let mut v = gated_vehicle(&gate);
        v.reset_parts([("body", body())]);

        v.update(&flying(Vec3::Z));
        assert!(v.evaluator().is_pending(AIRSTREAM));

        v.reset_parts([("body", body())]);
        assert!(!v.evaluator().is_pending(AIRSTREAM));

        gate.set(true);
        v.update(&flying(Vec3::Z));
        // The resubmitted request is still in flight; nothing stale was stored.
        assert!(v.airstream().is_none());

        v.update(&flying(Vec3::Z));
        let r = v.airstream().unwrap();
        assert_eq!(r.outcome, Outcome::Measured);
        assert!((r.area_of(&"body") - 4.0).abs() < 1e-4);
    }

    #[test]
    fn reset_parts_forgets_previous_results() {
        let mut v = vehicle();
        v.update(&flying(Vec3::Z));
        assert!(v.airstream().is_some());
        v.reset_parts([("body", body())]);
        assert!(v.airstream().is_none());
        assert!(v.sun().is_none());
    }

    #[test]
    fn debug_view_uses_configured_background() {
        let mut v = vehicle();
        v.set_config(ExposureConfig { debug_background: [1, 2, 3, 255], ..config() });
        v.enable_debug(SUN);
        v.update(&flying(Vec3::Z));
        let dbg = v.debugger(SUN).unwrap();
        assert_eq!(dbg.background, [1, 2, 3, 255]);
        assert!(dbg.latest().is_some());
    }
}
