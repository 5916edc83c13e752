//! Request queue and evaluation state machine.
//!
//! At most one evaluation is pending per [`TargetId`]; submitting again
//! cancels the previous one (last request wins). GPU reductions complete over
//! later [`Evaluator::update`] calls, CPU reductions complete inside
//! [`Evaluator::submit`]. Every accepted request that is not cancelled ends in
//! exactly one callback invocation.

mod request;
mod result;
mod state;

pub use request::{RenderRequest, TargetId};
pub use result::{Outcome, RenderResult};
pub use state::EvaluationState;

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::area;
use crate::debug::DebugVisualizer;
use crate::device::{Gpu, PhysicalDevice};
use crate::error::ExposureError;
use crate::geometry::CameraInfo;
use crate::reduce::{
    CpuReducer, GpuReducer, PendingReduction, PixelReducer, ReducedFrame, Reduction, ReductionPoll,
};
use crate::render::{GpuRasterizer, Rasterizer, SoftwareRasterizer};
use crate::scene::{DrawList, ObjectTagger};

/// Receives the result of an evaluation. Never called for cancelled ones.
pub type ResultCallback<K> = Box<dyn FnOnce(RenderResult<K>)>;

struct PendingEvaluation<K> {
    generation: u64,
    request: RenderRequest,
    camera: CameraInfo,
    scene: DrawList,
    device: PhysicalDevice,
    state: EvaluationState,
    reduction: Option<Box<dyn PendingReduction>>,
    callback: ResultCallback<K>,
    omitted: usize,
    want_image: bool,
}

/// Drives evaluations from submission to delivery.
///
/// The evaluator is owned by one vehicle (or other consumer) and driven from a
/// single thread. It borrows the [`ObjectTagger`] on every call instead of
/// holding it, so the owner can keep re-tagging between ticks.
pub struct Evaluator<K> {
    rasterizer: Box<dyn Rasterizer>,
    gpu_reducer: Option<Box<dyn PixelReducer>>,
    cpu_reducer: CpuReducer,
    /// CPU path used for retries after a device failure.
    fallback: Box<dyn Rasterizer>,

    pending: HashMap<TargetId, PendingEvaluation<K>>,
    /// Cancelled readbacks still owned by the device; dropped once finished.
    draining: Vec<Box<dyn PendingReduction>>,
    last_state: HashMap<TargetId, EvaluationState>,
    delivered: HashMap<TargetId, u64>,
    debuggers: HashMap<TargetId, DebugVisualizer>,
    next_generation: u64,
}

impl<K> Evaluator<K> {
    /// CPU-only evaluator.
    pub fn software() -> Self {
        Self::with_backends(Box::new(SoftwareRasterizer::new()), None)
    }

    /// Evaluator rendering on `gpu`; counts on the GPU when compute shaders
    /// are available.
    pub fn with_gpu(gpu: &Gpu) -> Self {
        let reducer: Option<Box<dyn PixelReducer>> = gpu
            .supports_compute()
            .then(|| Box::new(GpuReducer::new(gpu)) as Box<dyn PixelReducer>);
        Self::with_backends(Box::new(GpuRasterizer::new(gpu)), reducer)
    }

    /// Evaluator over explicit backends. `gpu_reducer` being `Some` is what
    /// makes the GPU path selectable.
    pub fn with_backends(
        rasterizer: Box<dyn Rasterizer>,
        gpu_reducer: Option<Box<dyn PixelReducer>>,
    ) -> Self {
        Self {
            rasterizer,
            gpu_reducer,
            cpu_reducer: CpuReducer::new(),
            fallback: Box::new(SoftwareRasterizer::new()),
            pending: HashMap::new(),
            draining: Vec::new(),
            last_state: HashMap::new(),
            delivered: HashMap::new(),
            debuggers: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Replaces the rasterizer used for CPU retries.
    pub fn with_fallback(mut self, fallback: Box<dyn Rasterizer>) -> Self {
        self.fallback = fallback;
        self
    }

    #[inline]
    pub fn supports_compute(&self) -> bool {
        self.gpu_reducer.is_some()
    }

    pub fn state(&self, target: TargetId) -> EvaluationState {
        match self.pending.get(&target) {
            Some(p) => p.state,
            None => self.last_state.get(&target).copied().unwrap_or_default(),
        }
    }

    #[inline]
    pub fn is_pending(&self, target: TargetId) -> bool {
        self.pending.contains_key(&target)
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancelled readbacks not yet released by the device.
    #[inline]
    pub fn draining_count(&self) -> usize {
        self.draining.len()
    }

    /// Cancels the pending evaluation of `target`. Its callback is dropped
    /// without being called; an in-flight readback is left to finish and then
    /// discarded.
    pub fn cancel(&mut self, target: TargetId) -> bool {
        let Some(mut p) = self.pending.remove(&target) else {
            return false;
        };
        p.state = EvaluationState::Cancelled;
        if let Some(reduction) = p.reduction.take() {
            self.draining.push(reduction);
        }
        self.last_state.insert(target, EvaluationState::Cancelled);
        log::debug!("evaluation {target:?}#{} cancelled", p.generation);
        true
    }

    /// Teardown: cancels everything and releases all device resources now.
    pub fn cancel_all(&mut self) {
        for (target, p) in self.pending.drain() {
            self.last_state.insert(target, EvaluationState::Cancelled);
            log::debug!("evaluation {target:?}#{} cancelled at teardown", p.generation);
        }
        self.draining.clear();
    }

    /// Debug visualizer fed with every result delivered for `target`. While
    /// attached, reductions also return the tag image.
    pub fn attach_debugger(&mut self, target: TargetId, debugger: DebugVisualizer) {
        self.debuggers.insert(target, debugger);
    }

    pub fn detach_debugger(&mut self, target: TargetId) -> Option<DebugVisualizer> {
        self.debuggers.remove(&target)
    }

    pub fn debugger(&self, target: TargetId) -> Option<&DebugVisualizer> {
        self.debuggers.get(&target)
    }

    pub fn debugger_mut(&mut self, target: TargetId) -> Option<&mut DebugVisualizer> {
        self.debuggers.get_mut(&target)
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Rasterizes and starts the reduction on the selected path.
    fn start(&mut self, p: &PendingEvaluation<K>) -> Result<Reduction, ExposureError> {
        let frame = self
            .rasterizer
            .render(&p.scene, Some(&p.camera), p.request.resolution)?;
        let palette_len = p.scene.palette_len();
        match (p.device, self.gpu_reducer.as_mut()) {
            (PhysicalDevice::Gpu, Some(reducer)) => reducer.reduce(&frame, palette_len, p.want_image),
            _ => self.cpu_reducer.reduce(&frame, palette_len, p.want_image),
        }
    }

    /// Software rasterizer + CPU reducer, synchronously.
    fn run_on_cpu(&mut self, p: &PendingEvaluation<K>) -> Result<ReducedFrame, ExposureError> {
        let frame = self
            .fallback
            .render(&p.scene, Some(&p.camera), p.request.resolution)?;
        match self.cpu_reducer.reduce(&frame, p.scene.palette_len(), p.want_image)? {
            Reduction::Ready(out) => Ok(out),
            Reduction::Pending(_) => Err(ExposureError::DeviceFailure(
                "cpu reduction did not complete".into(),
            )),
        }
    }
}

impl<K: Clone + Eq + Hash + fmt::Display> Evaluator<K> {
    /// Starts evaluating `request` for `target`, superseding any pending
    /// evaluation of that target. Returns the submission's generation.
    ///
    /// Disabled and degenerate requests, and requests served by the CPU path,
    /// invoke `callback` before returning.
    pub fn submit<F>(
        &mut self,
        target: TargetId,
        request: RenderRequest,
        tagger: &ObjectTagger<K>,
        callback: F,
    ) -> u64
    where
        F: FnOnce(RenderResult<K>) + 'static,
    {
        if self.cancel(target) {
            log::debug!("evaluation {target:?} superseded");
        }
        let generation = self.next_generation();
        let callback: ResultCallback<K> = Box::new(callback);

        let Some(device) = request.device.select(self.supports_compute()) else {
            let result = RenderResult::empty(target, generation, &request, Outcome::Disabled);
            self.deliver(&request, result, None, callback);
            return generation;
        };

        let scene = tagger.draw_list();
        let omitted = tagger.rejected().len();
        let camera = match request.camera() {
            Some(camera) if !scene.is_empty() => camera,
            _ => {
                log::debug!("evaluation {target:?}#{generation} degenerate");
                let mut result = RenderResult::empty(target, generation, &request, Outcome::Degenerate);
                result.omitted_objects = omitted;
                self.deliver(&request, result, None, callback);
                return generation;
            }
        };

        let mut p = PendingEvaluation {
            generation,
            want_image: self.debuggers.contains_key(&target),
            request,
            camera,
            scene,
            device,
            state: EvaluationState::Rasterizing,
            reduction: None,
            callback,
            omitted,
        };
        log::debug!(
            "evaluation {target:?}#{generation} on {device:?}: {} draws, {} triangles",
            p.scene.len(),
            p.scene.total_triangles()
        );

        match self.start(&p) {
            Ok(Reduction::Ready(out)) => self.complete(target, p, out, device, tagger),
            Ok(Reduction::Pending(reduction)) => {
                p.state = EvaluationState::Reducing;
                p.reduction = Some(reduction);
                self.pending.insert(target, p);
            }
            Err(err) => self.retry_on_cpu(target, p, err, tagger),
        }
        generation
    }

    /// Advances in-flight evaluations without blocking; call once per tick.
    pub fn update(&mut self, tagger: &ObjectTagger<K>) {
        self.draining
            .retain_mut(|r| matches!(r.poll(), ReductionPoll::Pending));

        let mut targets: Vec<TargetId> = self.pending.keys().copied().collect();
        targets.sort();

        for target in targets {
            let polled = match self.pending.get_mut(&target).and_then(|p| p.reduction.as_mut()) {
                Some(reduction) => reduction.poll(),
                None => continue,
            };
            match polled {
                ReductionPoll::Pending => {}
                ReductionPoll::Ready(out) => {
                    if let Some(mut p) = self.pending.remove(&target) {
                        p.reduction = None;
                        let device = p.device;
                        self.complete(target, p, out, device, tagger);
                    }
                }
                ReductionPoll::Failed(err) => {
                    if let Some(mut p) = self.pending.remove(&target) {
                        p.reduction = None;
                        self.retry_on_cpu(target, p, err, tagger);
                    }
                }
            }
        }
    }

    fn retry_on_cpu(
        &mut self,
        target: TargetId,
        mut p: PendingEvaluation<K>,
        err: ExposureError,
        tagger: &ObjectTagger<K>,
    ) {
        log::warn!(
            "evaluation {target:?}#{} failed on {:?} ({err}); retrying on CPU",
            p.generation,
            p.device
        );
        p.state = EvaluationState::Rasterizing;
        match self.run_on_cpu(&p) {
            Ok(out) => self.complete(target, p, out, PhysicalDevice::Cpu, tagger),
            Err(retry_err) => {
                log::error!(
                    "evaluation {target:?}#{} failed on CPU retry ({retry_err})\n{}",
                    p.generation,
                    tagger.describe()
                );
                let mut result = RenderResult::empty(
                    target,
                    p.generation,
                    &p.request,
                    Outcome::Failed(retry_err),
                );
                result.omitted_objects = p.omitted;
                self.deliver(&p.request, result, None, p.callback);
            }
        }
    }

    fn complete(
        &mut self,
        target: TargetId,
        mut p: PendingEvaluation<K>,
        out: ReducedFrame,
        device: PhysicalDevice,
        tagger: &ObjectTagger<K>,
    ) {
        p.state = EvaluationState::Converting;
        let pixel_area = p.camera.pixel_area(p.request.resolution);
        let scene = &p.scene;
        let mut slots = HashMap::new();
        let areas = area::convert(&out.histogram, pixel_area, |slot| {
            let object = scene.id_at(slot).and_then(|id| tagger.resolve(id)).cloned()?;
            slots.insert(object.clone(), slot);
            Some(object)
        });

        let mut result = RenderResult::measured(
            target,
            p.generation,
            &p.request,
            &p.camera,
            device,
            out.histogram,
            areas,
            slots,
        );
        result.omitted_objects = p.omitted;
        self.deliver(&p.request, result, out.image.as_ref(), p.callback);
    }

    fn deliver(
        &mut self,
        request: &RenderRequest,
        result: RenderResult<K>,
        image: Option<&crate::render::Image>,
        callback: ResultCallback<K>,
    ) {
        let target = result.target;
        let last = self.delivered.get(&target).copied().unwrap_or(0);
        if result.generation <= last {
            log::debug!(
                "discarding stale result {target:?}#{} (delivered #{last})",
                result.generation
            );
            return;
        }
        self.delivered.insert(target, result.generation);
        self.last_state.insert(target, EvaluationState::Delivered);

        if let (Some(debugger), Some(image)) = (self.debuggers.get_mut(&target), image) {
            debugger.observe(request, &result, image);
        }
        log::debug!(
            "evaluation {target:?}#{} delivered: {} objects, {:.4} m2",
            result.generation,
            result.areas.len(),
            result.total_area()
        );
        callback(result);
    }
}

impl<K> Drop for Evaluator<K> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::Arc;

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::device::DevicePreference;
    use crate::geometry::{Bounds, Resolution};
    use crate::render::Frame;
    use crate::scene::{Mesh, Surface};

    type Sink = Rc<RefCell<Vec<RenderResult<&'static str>>>>;

    const T: TargetId = TargetId(0);

    fn sink() -> Sink {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn collect(sink: &Sink) -> impl FnOnce(RenderResult<&'static str>) + 'static {
        let sink = Rc::clone(sink);
        move |r| sink.borrow_mut().push(r)
    }

    fn cuboid(min: Vec3, max: Vec3) -> Surface {
        Surface::new(Arc::new(Mesh::cuboid(min, max)), Mat4::IDENTITY)
    }

    fn cube_tagger() -> ObjectTagger<&'static str> {
        let mut tagger = ObjectTagger::new();
        tagger
            .setup_renderers("cube", [cuboid(Vec3::splat(-1.0), Vec3::ONE)])
            .unwrap();
        tagger
    }

    fn unit_request(device: DevicePreference) -> RenderRequest {
        RenderRequest::new(Vec3::Z, Bounds::new(Vec3::ZERO, Vec3::ONE))
            .with_resolution(Resolution::square(4))
            .with_device(device)
    }

    /// Readback that completes only once the gate is open.
    struct GatedReadback {
        gate: Rc<Cell<bool>>,
        out: Option<ReducedFrame>,
        fail: bool,
    }

    impl PendingReduction for GatedReadback {
        fn poll(&mut self) -> ReductionPoll {
            if !self.gate.get() {
                return ReductionPoll::Pending;
            }
            if self.fail {
                return ReductionPoll::Failed(ExposureError::DeviceFailure("injected".into()));
            }
            match self.out.take() {
                Some(out) => ReductionPoll::Ready(out),
                None => ReductionPoll::Failed(ExposureError::DeviceFailure("consumed".into())),
            }
        }
    }

    struct GatedReducer {
        gate: Rc<Cell<bool>>,
        fail: bool,
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
            let histogram = CpuReducer::count(&image, palette_len);
            Ok(Reduction::Pending(Box::new(GatedReadback {
                gate: Rc::clone(&self.gate),
                out: Some(ReducedFrame {
                    histogram,
                    image: want_image.then_some(image),
                }),
                fail: self.fail,
            })))
        }
    }

    struct CountingRasterizer {
        calls: Rc<Cell<usize>>,
        inner: SoftwareRasterizer,
    }

    impl Rasterizer for CountingRasterizer {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn render(
            &mut self,
            scene: &DrawList,
            camera: Option<&CameraInfo>,
            resolution: crate::geometry::Resolution,
        ) -> Result<Frame, ExposureError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.render(scene, camera, resolution)
        }
    }

    struct FailingRasterizer;

    impl Rasterizer for FailingRasterizer {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn render(
            &mut self,
            _: &DrawList,
            _: Option<&CameraInfo>,
            _: crate::geometry::Resolution,
        ) -> Result<Frame, ExposureError> {
            Err(ExposureError::DeviceFailure("injected".into()))
        }
    }

    fn gated(gate: &Rc<Cell<bool>>, fail: bool) -> Evaluator<&'static str> {
        Evaluator::with_backends(
            Box::new(SoftwareRasterizer::new()),
            Some(Box::new(GatedReducer {
                gate: Rc::clone(gate),
                fail,
            })),
        )
    }

    // ── CPU path ──────────────────────────────────────────────────────────

    #[test]
    fn cpu_unit_cube_is_four_square_meters() {
        let tagger = cube_tagger();
        let out = sink();
        let mut eval = Evaluator::software();
        eval.submit(T, unit_request(DevicePreference::Cpu), &tagger, collect(&out));

        let results = out.borrow();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.outcome, Outcome::Measured);
        assert_eq!(r.device, Some(PhysicalDevice::Cpu));
        assert_eq!(r.histogram.total(), 16);
        assert!((r.area_of(&"cube") - 4.0).abs() < 1e-4);
        assert!((r.center_distance - 1.0).abs() < 1e-5);
        assert_eq!(eval.state(T), EvaluationState::Delivered);
    }

    #[test]
    fn halves_each_get_two_square_meters() {
        let mut tagger = ObjectTagger::new();
        tagger
            .setup_renderers("left", [cuboid(Vec3::splat(-1.0), Vec3::new(0.0, 1.0, 1.0))])
            .unwrap();
        tagger
            .setup_renderers("right", [cuboid(Vec3::new(0.0, -1.0, -1.0), Vec3::ONE)])
            .unwrap();
        let out = sink();
        Evaluator::software().submit(T, unit_request(DevicePreference::Cpu), &tagger, collect(&out));

        let r = &out.borrow()[0];
        // One pixel of tolerance.
        assert!((r.area_of(&"left") - 2.0).abs() <= 0.25 + 1e-6);
        assert!((r.area_of(&"right") - 2.0).abs() <= 0.25 + 1e-6);
        assert!(r.total_area() <= r.frame_area() + 1e-9);
    }

    #[test]
    fn areas_never_exceed_frame_area() {
        let mut tagger = ObjectTagger::new();
        tagger
            .setup_renderers("a", [cuboid(Vec3::new(-1.0, -0.2, -0.3), Vec3::new(0.4, 0.9, 0.2))])
            .unwrap();
        tagger
            .setup_renderers("b", [cuboid(Vec3::new(-0.5, -1.0, -1.0), Vec3::new(1.0, 0.1, 1.0))])
            .unwrap();
        let request = RenderRequest::new(Vec3::new(0.4, -0.3, 0.8), Bounds::new(Vec3::ZERO, Vec3::ONE))
            .with_resolution(Resolution::new(32, 24))
            .with_device(DevicePreference::Cpu);
        let out = sink();
        Evaluator::software().submit(T, request, &tagger, collect(&out));

        let r = &out.borrow()[0];
        assert_eq!(r.areas.len(), 2);
        assert!(r.total_area() <= r.frame_area() + 1e-9);
    }

    #[test]
    fn identical_cpu_requests_give_identical_histograms() {
        let mut tagger = ObjectTagger::new();
        tagger
            .setup_renderers("a", [cuboid(Vec3::new(-1.0, -0.2, -0.3), Vec3::new(0.4, 0.9, 0.2))])
            .unwrap();
        tagger
            .setup_renderers("b", [cuboid(Vec3::new(-0.5, -1.0, -1.0), Vec3::new(1.0, 0.1, 1.0))])
            .unwrap();
        let request = RenderRequest::new(Vec3::new(0.3, -0.7, 0.6), Bounds::new(Vec3::ZERO, Vec3::ONE))
            .with_resolution(Resolution::new(37, 29))
            .with_device(DevicePreference::Cpu);

        let out = sink();
        let mut eval = Evaluator::software();
        eval.submit(T, request.clone(), &tagger, collect(&out));
        eval.submit(T, request, &tagger, collect(&out));

        let results = out.borrow();
        assert_eq!(results.len(), 2);
        assert!(results[0].histogram.total() > 0);
        assert_eq!(results[0].histogram, results[1].histogram);
        assert_eq!(results[0].areas, results[1].areas);
    }

    // ── empty results ─────────────────────────────────────────────────────

    #[test]
    fn device_none_yields_empty_result_without_rasterizing() {
        let calls = Rc::new(Cell::new(0));
        let mut eval: Evaluator<&'static str> = Evaluator::with_backends(
            Box::new(CountingRasterizer {
                calls: Rc::clone(&calls),
                inner: SoftwareRasterizer::new(),
            }),
            None,
        );
        let out = sink();
        eval.submit(T, unit_request(DevicePreference::None), &cube_tagger(), collect(&out));

        assert_eq!(calls.get(), 0);
        let results = out.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, Outcome::Disabled);
        assert!(results[0].areas.is_empty());
    }

    #[test]
    fn zero_objects_yields_empty_result() {
        let out = sink();
        let tagger = ObjectTagger::new();
        Evaluator::software().submit(T, unit_request(DevicePreference::Cpu), &tagger, collect(&out));
        let results = out.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, Outcome::Degenerate);
        assert!(results[0].areas.is_empty());
    }

    #[test]
    fn zero_volume_bounds_yield_empty_result() {
        let out = sink();
        let request = RenderRequest::new(Vec3::Z, Bounds::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)))
            .with_device(DevicePreference::Cpu);
        Evaluator::software().submit(T, request, &cube_tagger(), collect(&out));
        assert_eq!(out.borrow()[0].outcome, Outcome::Degenerate);
    }

    // ── GPU path ──────────────────────────────────────────────────────────

    #[test]
    fn async_reduction_delivers_on_update() {
        let gate = Rc::new(Cell::new(false));
        let tagger = cube_tagger();
        let out = sink();
        let mut eval = gated(&gate, false);

        eval.submit(T, unit_request(DevicePreference::PreferGpu), &tagger, collect(&out));
        assert!(eval.is_pending(T));
        assert_eq!(eval.state(T), EvaluationState::Reducing);

        eval.update(&tagger);
        assert!(out.borrow().is_empty());

        gate.set(true);
        eval.update(&tagger);
        assert!(!eval.is_pending(T));
        let results = out.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].device, Some(PhysicalDevice::Gpu));
        assert!((results[0].area_of(&"cube") - 4.0).abs() < 1e-4);
    }

    #[test]
    fn newer_request_supersedes_pending_one() {
        let gate = Rc::new(Cell::new(false));
        let tagger = cube_tagger();
        let out = sink();
        let mut eval = gated(&gate, false);

        let first = eval.submit(T, unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        let second = eval.submit(T, unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        assert!(second > first);
        assert_eq!(eval.pending_count(), 1);
        assert_eq!(eval.draining_count(), 1);

        gate.set(true);
        eval.update(&tagger);

        let results = out.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].generation, second);
        assert_eq!(eval.draining_count(), 0);
    }

    #[test]
    fn independent_targets_do_not_cancel_each_other() {
        let gate = Rc::new(Cell::new(false));
        let tagger = cube_tagger();
        let out = sink();
        let mut eval = gated(&gate, false);

        eval.submit(TargetId(0), unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        eval.submit(TargetId(1), unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        gate.set(true);
        eval.update(&tagger);

        let targets: Vec<TargetId> = out.borrow().iter().map(|r| r.target).collect();
        assert_eq!(targets, vec![TargetId(0), TargetId(1)]);
    }

    #[test]
    fn cancelled_evaluation_never_calls_back() {
        let gate = Rc::new(Cell::new(false));
        let tagger = cube_tagger();
        let out = sink();
        let mut eval = gated(&gate, false);

        eval.submit(T, unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        assert!(eval.cancel(T));
        assert!(!eval.cancel(T));
        assert_eq!(eval.state(T), EvaluationState::Cancelled);

        gate.set(true);
        eval.update(&tagger);
        assert!(out.borrow().is_empty());
        assert_eq!(eval.draining_count(), 0);
    }

    #[test]
    fn teardown_drops_everything_immediately() {
        let gate = Rc::new(Cell::new(false));
        let tagger = cube_tagger();
        let out = sink();
        let mut eval = gated(&gate, false);

        eval.submit(TargetId(0), unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        eval.submit(TargetId(1), unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        eval.cancel_all();
        assert_eq!(eval.pending_count(), 0);
        assert_eq!(eval.draining_count(), 0);
        drop(eval);
        assert!(out.borrow().is_empty());
    }

    // ── failures ──────────────────────────────────────────────────────────

    #[test]
    fn failed_readback_retries_on_cpu() {
        let gate = Rc::new(Cell::new(true));
        let tagger = cube_tagger();
        let out = sink();
        let mut eval = gated(&gate, true);

        eval.submit(T, unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        eval.update(&tagger);

        let results = out.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, Outcome::Measured);
        assert_eq!(results[0].device, Some(PhysicalDevice::Cpu));
        assert!((results[0].area_of(&"cube") - 4.0).abs() < 1e-4);
    }

    #[test]
    fn failed_rasterization_retries_on_cpu() {
        let out = sink();
        let mut eval: Evaluator<&'static str> =
            Evaluator::with_backends(Box::new(FailingRasterizer), None);
        eval.submit(T, unit_request(DevicePreference::Cpu), &cube_tagger(), collect(&out));

        let r = &out.borrow()[0];
        assert_eq!(r.outcome, Outcome::Measured);
        assert!((r.area_of(&"cube") - 4.0).abs() < 1e-4);
    }

    #[test]
    fn failed_retry_delivers_failure() {
        let out = sink();
        let mut eval: Evaluator<&'static str> =
            Evaluator::with_backends(Box::new(FailingRasterizer), None)
                .with_fallback(Box::new(FailingRasterizer));
        eval.submit(T, unit_request(DevicePreference::Cpu), &cube_tagger(), collect(&out));

        let results = out.borrow();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_failed());
        assert!(results[0].areas.is_empty());
    }

    // ── identifiers ───────────────────────────────────────────────────────

    #[test]
    fn colors_reset_mid_flight_are_not_reported() {
        let gate = Rc::new(Cell::new(false));
        let mut tagger = cube_tagger();
        let out = sink();
        let mut eval = gated(&gate, false);

        eval.submit(T, unit_request(DevicePreference::Gpu), &tagger, collect(&out));
        tagger.reset();
        tagger
            .setup_renderers("other", [cuboid(Vec3::splat(-1.0), Vec3::ONE)])
            .unwrap();

        gate.set(true);
        eval.update(&tagger);
        let r = &out.borrow()[0];
        assert!(r.areas.is_empty());
        assert_eq!(r.histogram.total(), 16);
    }

    #[test]
    fn objects_without_color_are_counted_as_omitted() {
        let mut tagger = ObjectTagger::with_capacity(1);
        tagger
            .setup_renderers("kept", [cuboid(Vec3::splat(-1.0), Vec3::ONE)])
            .unwrap();
        assert!(tagger
            .setup_renderers("dropped", [cuboid(Vec3::splat(-1.0), Vec3::ONE)])
            .is_err());

        let out = sink();
        Evaluator::software().submit(T, unit_request(DevicePreference::Cpu), &tagger, collect(&out));
        let r = &out.borrow()[0];
        assert_eq!(r.omitted_objects, 1);
        assert_eq!(r.areas.keys().copied().collect::<Vec<_>>(), vec!["kept"]);
    }

    // ── debugger ──────────────────────────────────────────────────────────

    #[test]
    fn attached_debugger_observes_delivery() {
        let tagger = cube_tagger();
        let out = sink();
        let mut eval = Evaluator::software();
        eval.attach_debugger(T, DebugVisualizer::new());
        eval.submit(T, unit_request(DevicePreference::Cpu), &tagger, collect(&out));

        let debugger = eval.debugger(T).unwrap();
        let view = debugger.latest().unwrap();
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].label, "cube");
        assert!(eval.detach_debugger(T).is_some());
    }
}
