//! Visibility session: the per-image state machine that ties everything together.
//!
//! ```text
//! NotMounted ──mount──▶ NotEntered ──signal + oracle true──▶ Entered
//! ```
//!
//! `Entered` is sticky for the lifetime of the session. The first transition
//! into it selects a source and starts the probe. A resize re-selects in any
//! phase, since the matching source depends on the viewport width:
//!
//! | Signal | Work |
//! |---|---|
//! | `Initial`, `Scroll` | cheap oracle check with cached position; nothing once entered |
//! | `Resize` | re-measure position and canvas, re-check the oracle, re-select source, re-classify fit |
//!
//! Probe results are applied by [`LazyImage::poll`] (or [`LazyImage::wait`]),
//! which also reclassifies the fit. Observers are told about every change of
//! the [`RenderState`].

use crate::config::FrameConfig;
use crate::imaging::{canvas_height, classify};
use crate::loader::{ImageLoader, LoadOutcome, ProbeDispatch, StartLoad};
use crate::media::MediaContext;
use crate::selection::{ConfigurationError, select_source};
use crate::types::{Geometry, RenderState, StretchState, StretchStrategy, background_string};
use crate::viewport::LoadingArea;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("session is not mounted")]
    NotMounted,
}

/// Environment events the host forwards to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// First check after the host has laid the element out. Treated like a scroll.
    Initial,
    Scroll,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotMounted,
    NotEntered,
    Entered,
}

/// Snapshot of the visibility bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilitySessionState {
    pub has_entered_viewport: bool,
    pub buffer_size: f64,
    pub element_top: f64,
}

/// What the session needs to know about the host's display.
pub trait Environment {
    fn scroll_offset(&self) -> f64;
    fn viewport_height(&self) -> f64;
    /// Document-relative top of the element.
    fn element_top(&self) -> f64;
    /// Rendered box of the element.
    fn element_box(&self) -> Geometry;
    fn matches_media(&self, condition: &str) -> bool;
}

/// Plain-data [`Environment`], with media conditions evaluated by [`MediaContext`].
#[derive(Debug, Clone, PartialEq)]
pub struct StaticEnvironment {
    pub scroll_offset: f64,
    pub element_top: f64,
    pub element: Geometry,
    pub media: MediaContext,
}

impl StaticEnvironment {
    pub fn new(viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            scroll_offset: 0.0,
            element_top: 0.0,
            element: Geometry::default(),
            media: MediaContext::screen(viewport_width, viewport_height),
        }
    }

    pub fn scrolled_to(mut self, offset: f64) -> Self {
        self.scroll_offset = offset;
        self
    }

    pub fn with_element(mut self, top: f64, size: Geometry) -> Self {
        self.element_top = top;
        self.element = size;
        self
    }
}

impl Environment for StaticEnvironment {
    fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    fn viewport_height(&self) -> f64 {
        self.media.viewport_height
    }

    fn element_top(&self) -> f64 {
        self.element_top
    }

    fn element_box(&self) -> Geometry {
        self.element
    }

    fn matches_media(&self, condition: &str) -> bool {
        self.media.matches(condition)
    }
}

/// Receives the render state after every change.
pub trait Observer {
    fn state_changed(&mut self, state: &RenderState);
}

impl<F: FnMut(&RenderState)> Observer for F {
    fn state_changed(&mut self, state: &RenderState) {
        self(state)
    }
}

/// One lazily loaded, responsive image.
pub struct LazyImage<D: ProbeDispatch> {
    config: FrameConfig,
    loader: ImageLoader<D>,
    phase: Phase,
    area: LoadingArea,
    container: Geometry,
    image: Option<Geometry>,
    state: RenderState,
    last_notified: Option<RenderState>,
    observers: Vec<Box<dyn Observer>>,
}

impl<D: ProbeDispatch> LazyImage<D> {
    pub fn new(config: FrameConfig, dispatch: D) -> Self {
        Self {
            config,
            loader: ImageLoader::new(dispatch),
            phase: Phase::NotMounted,
            area: LoadingArea::default(),
            container: Geometry::default(),
            image: None,
            state: RenderState {
                loading: true,
                ..RenderState::default()
            },
            last_notified: None,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn load_outcome(&self) -> LoadOutcome {
        self.loader.outcome()
    }

    pub fn loader(&self) -> &ImageLoader<D> {
        &self.loader
    }

    pub fn visibility(&self) -> VisibilitySessionState {
        VisibilitySessionState {
            has_entered_viewport: self.phase == Phase::Entered,
            buffer_size: self.area.buffer_size,
            element_top: self.area.element_top,
        }
    }

    /// Measure the element and reserve canvas space. Never loads.
    pub fn mount(&mut self, env: &impl Environment) {
        if self.phase != Phase::NotMounted {
            tracing::debug!("mount on an already mounted session ignored");
            return;
        }
        self.phase = Phase::NotEntered;
        self.measure_canvas(env);
        self.measure_position(env);
        tracing::debug!(
            buffer = self.area.buffer_size,
            top = self.area.element_top,
            "mounted"
        );
        self.notify();
    }

    /// Handle one environment signal.
    ///
    /// A [`ConfigurationError`] aborts only the load it was raised for; the
    /// session stays mounted and recovers through
    /// [`update_config`](Self::update_config).
    pub fn handle(&mut self, signal: Signal, env: &impl Environment) -> Result<(), SessionError> {
        if self.phase == Phase::NotMounted {
            return Err(SessionError::NotMounted);
        }
        let result = match signal {
            Signal::Initial | Signal::Scroll => self.on_scroll(env),
            Signal::Resize => self.on_resize(env),
        };
        self.notify();
        result
    }

    fn on_scroll(&mut self, env: &impl Environment) -> Result<(), SessionError> {
        if self.try_enter(env) {
            self.update_responsive_image(env)?;
        }
        Ok(())
    }

    fn on_resize(&mut self, env: &impl Environment) -> Result<(), SessionError> {
        self.measure_position(env);
        self.try_enter(env);
        self.measure_canvas(env);
        let result = self.update_responsive_image(env);
        self.update_stretch_state();
        result
    }

    /// Oracle check. Returns `true` only on the transition into `Entered`.
    fn try_enter(&mut self, env: &impl Environment) -> bool {
        if self.phase != Phase::NotEntered {
            return false;
        }
        if !self.area.contains(env.scroll_offset(), env.viewport_height()) {
            return false;
        }
        self.phase = Phase::Entered;
        self.state.has_entered_viewport = true;
        tracing::debug!(
            scroll = env.scroll_offset(),
            top = self.area.element_top,
            "entered loading area"
        );
        true
    }

    fn measure_position(&mut self, env: &impl Environment) {
        self.area = LoadingArea::measure(
            env.viewport_height(),
            env.element_top(),
            self.config.viewport.max_buffer,
        );
    }

    /// Reserved canvas: from `canvas_ratio` for crop and stretch, the
    /// loaded image's size for original, nothing otherwise.
    fn measure_canvas(&mut self, env: &impl Environment) {
        self.container = env.element_box();
        let fit = &self.config.fit;
        let canvas = match canvas_height(fit.stretch_strategy, self.container.width, fit.canvas_ratio)
        {
            Some(height) => Some(Geometry::new(self.container.width, height)),
            None if fit.stretch_strategy == StretchStrategy::Original => self.image,
            None => None,
        };
        self.state.canvas_width = canvas.map(|c| c.width);
        self.state.canvas_height = canvas.map(|c| c.height);
    }

    /// Validate, select a source, and start probing it if it changed.
    fn update_responsive_image(&mut self, env: &impl Environment) -> Result<(), SessionError> {
        let selected = select_source(&self.config.sources, |c| env.matches_media(c))?
            .map(str::to_string);

        match selected {
            Some(url) => {
                if let StartLoad::Started(_) = self.loader.start_load(&url) {
                    self.state.background = Some(background_string(&url));
                    self.state.matched_url = Some(self.matched_url_for(&url));
                    self.state.loading = true;
                    self.state.error_occurred = false;
                    self.image = None;
                }
            }
            None => {
                tracing::warn!(
                    sources = self.config.sources.len(),
                    "no source matches the current environment"
                );
                self.loader.abandon();
                self.image = None;
                self.state.stretch_state = None;
                if self.config.fit.stretch_strategy == StretchStrategy::Original {
                    self.state.canvas_width = None;
                    self.state.canvas_height = None;
                }
                self.state.background = Some(background_string(""));
                self.state.matched_url = None;
                self.state.loading = false;
                self.state.error_occurred = true;
            }
        }

        if self.config.fit.stretch_strategy == StretchStrategy::Crop {
            self.measure_canvas(env);
        }
        Ok(())
    }

    fn matched_url_for(&self, url: &str) -> String {
        match &self.config.metadata {
            Some(meta) if !meta.url.is_empty() => meta.url.clone(),
            _ => url.to_string(),
        }
    }

    /// Box the image is fit into: the reserved canvas when there is one,
    /// otherwise the measured element.
    fn fit_box(&self) -> Geometry {
        Geometry::new(
            self.container.width,
            self.state.canvas_height.unwrap_or(self.container.height),
        )
    }

    fn update_stretch_state(&mut self) {
        let Some(image) = self.image else {
            return;
        };
        let fit = &self.config.fit;
        if fit.stretch_strategy == StretchStrategy::Original {
            self.state.canvas_width = Some(image.width);
            self.state.canvas_height = Some(image.height);
            self.state.stretch_state = Some(StretchState::Original);
            return;
        }
        let resolved = classify(fit.stretch_strategy, image, self.fit_box(), fit.tolerance());
        if self.state.stretch_state != Some(resolved) {
            tracing::debug!(state = %resolved, "stretch state resolved");
        }
        self.state.stretch_state = Some(resolved);
    }

    fn absorb(&mut self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Loaded(geometry) => {
                self.state.loading = false;
                self.image = Some(geometry);
                self.update_stretch_state();
            }
            LoadOutcome::Failed => {
                self.state.loading = false;
                self.state.error_occurred = true;
            }
            LoadOutcome::Idle | LoadOutcome::Pending => {}
        }
        self.notify();
    }

    /// Apply any probe results that have arrived. Non-blocking.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        let outcome = self.loader.poll()?;
        self.absorb(outcome);
        Some(outcome)
    }

    /// Block until the pending probe resolves.
    pub fn wait(&mut self) -> Option<LoadOutcome> {
        let outcome = self.loader.wait()?;
        self.absorb(outcome);
        Some(outcome)
    }

    /// [`wait`](Self::wait) with an upper bound.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        let outcome = self.loader.wait_timeout(timeout)?;
        self.absorb(outcome);
        Some(outcome)
    }

    /// Replace the inputs (sources, metadata, fit settings).
    ///
    /// The canvas is re-measured; once entered, the source is re-selected
    /// and the fit reclassified.
    pub fn update_config(
        &mut self,
        config: FrameConfig,
        env: &impl Environment,
    ) -> Result<(), SessionError> {
        if self.phase == Phase::NotMounted {
            self.config = config;
            return Ok(());
        }
        self.config = config;
        self.measure_canvas(env);
        let result = if self.phase == Phase::Entered {
            self.update_responsive_image(env)
        } else {
            Ok(())
        };
        self.update_stretch_state();
        self.notify();
        result
    }

    /// Unmount. Any in-flight probe is detached and observers are dropped.
    pub fn dispose(self) {
        tracing::debug!(phase = ?self.phase, "session disposed");
        self.loader.dispose();
    }

    fn notify(&mut self) {
        if self.last_notified.as_ref() == Some(&self.state) {
            return;
        }
        for observer in &mut self.observers {
            observer.state_changed(&self.state);
        }
        self.last_notified = Some(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{BackendError, Dimensions};
    use crate::loader::DeferredDispatch;
    use crate::types::ImageSource;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn breakpoint_config(strategy: StretchStrategy) -> FrameConfig {
        let mut config = FrameConfig {
            sources: vec![
                ImageSource::new("(max-width:480px)", "a"),
                ImageSource::new("(min-width:481px)", "b"),
            ],
            ..FrameConfig::default()
        };
        config.fit.stretch_strategy = strategy;
        config
    }

    /// 500px wide viewport, 800px tall; element far below the fold.
    fn below_fold() -> StaticEnvironment {
        StaticEnvironment::new(500.0, 800.0).with_element(3000.0, Geometry::new(400.0, 300.0))
    }

    fn session(config: FrameConfig) -> (LazyImage<DeferredDispatch>, DeferredDispatch) {
        let dispatch = DeferredDispatch::new();
        (LazyImage::new(config, dispatch.clone()), dispatch)
    }

    fn resolve_all(dispatch: &DeferredDispatch, width: u32, height: u32) {
        for probe in dispatch.take_requests() {
            probe.resolve(Ok(Dimensions { width, height }));
        }
    }

    #[test]
    fn signals_before_mount_are_rejected() {
        let (mut img, _) = session(breakpoint_config(StretchStrategy::Crop));
        assert_eq!(
            img.handle(Signal::Scroll, &below_fold()),
            Err(SessionError::NotMounted)
        );
    }

    #[test]
    fn mount_measures_but_does_not_load() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        let env = StaticEnvironment::new(500.0, 800.0).with_element(10.0, Geometry::new(400.0, 300.0));
        img.mount(&env);
        assert_eq!(img.phase(), Phase::NotEntered);
        assert_eq!(img.visibility().buffer_size, 460.0);
        assert_eq!(img.visibility().element_top, 10.0);
        assert_eq!(dispatch.pending_count(), 0);
        assert!(img.state().loading);
    }

    #[test]
    fn initial_signal_loads_element_already_in_view() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        let env = StaticEnvironment::new(500.0, 800.0).with_element(10.0, Geometry::new(400.0, 300.0));
        img.mount(&env);
        img.handle(Signal::Initial, &env).unwrap();
        assert_eq!(img.phase(), Phase::Entered);
        assert_eq!(dispatch.pending_count(), 1);
    }

    #[test]
    fn scroll_into_loading_area_selects_and_loads() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        let env = below_fold();
        img.mount(&env);

        img.handle(Signal::Scroll, &env).unwrap();
        assert_eq!(img.phase(), Phase::NotEntered);
        assert_eq!(dispatch.pending_count(), 0);

        // 1740 + 800 + 460 = 3000
        let env = env.scrolled_to(1740.0);
        img.handle(Signal::Scroll, &env).unwrap();
        assert_eq!(img.phase(), Phase::Entered);
        assert!(img.visibility().has_entered_viewport);
        let requests = dispatch.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request.url, "b");
        assert_eq!(img.state().background.as_deref(), Some("url('b')"));
        assert_eq!(img.state().matched_url.as_deref(), Some("b"));
        assert!(img.state().loading);
    }

    #[test]
    fn visibility_is_sticky() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        assert_eq!(dispatch.take_requests().len(), 1);

        let back_up = below_fold();
        img.handle(Signal::Scroll, &back_up).unwrap();
        img.handle(Signal::Scroll, &env).unwrap();
        assert_eq!(img.phase(), Phase::Entered);
        assert_eq!(dispatch.pending_count(), 0);
    }

    #[test]
    fn load_success_classifies_fit() {
        let mut config = breakpoint_config(StretchStrategy::Crop);
        config.fit.max_crop_percentage = Some(30.0);
        let (mut img, dispatch) = session(config);
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();

        // 272x92 into a 400x300 box → far outside 30% → stretch
        resolve_all(&dispatch, 272, 92);
        assert_eq!(
            img.poll(),
            Some(LoadOutcome::Loaded(Geometry::new(272.0, 92.0)))
        );
        assert!(!img.state().loading);
        assert!(!img.state().error_occurred);
        assert_eq!(img.state().stretch_state, Some(StretchState::Stretch));
    }

    #[test]
    fn resize_reclassifies_with_last_image() {
        let mut config = breakpoint_config(StretchStrategy::Crop);
        config.fit.max_crop_percentage = Some(30.0);
        let (mut img, dispatch) = session(config);
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        resolve_all(&dispatch, 272, 92);
        img.poll();
        assert_eq!(img.state().stretch_state, Some(StretchState::Stretch));

        // Box reshaped to ratio 2.95
        let mut wide = env.clone();
        wide.element = Geometry::new(295.0, 100.0);
        img.handle(Signal::Resize, &wide).unwrap();
        assert_eq!(img.state().stretch_state, Some(StretchState::Crop));
        // Same url still selected: no new probe
        assert_eq!(dispatch.pending_count(), 0);
    }

    #[test]
    fn resize_across_breakpoint_switches_source() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Stretch));
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        resolve_all(&dispatch, 800, 600);
        img.poll();

        let mut narrow = env.clone();
        narrow.media = MediaContext::screen(400.0, 800.0);
        img.handle(Signal::Resize, &narrow).unwrap();
        let requests = dispatch.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request.url, "a");
        assert!(img.state().loading);
        assert_eq!(img.state().background.as_deref(), Some("url('a')"));
    }

    #[test]
    fn resize_before_entering_selects_and_loads() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        let env = below_fold();
        img.mount(&env);
        img.handle(Signal::Resize, &env).unwrap();
        assert_eq!(img.phase(), Phase::NotEntered);
        let requests = dispatch.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request.url, "b");
        assert_eq!(img.state().background.as_deref(), Some("url('b')"));

        // Entering later does not probe the same url again
        img.handle(Signal::Scroll, &env.scrolled_to(2000.0)).unwrap();
        assert_eq!(img.phase(), Phase::Entered);
        assert_eq!(dispatch.pending_count(), 0);
    }

    #[test]
    fn resize_with_empty_sources_is_configuration_error() {
        let (mut img, dispatch) = session(FrameConfig::default());
        let env = below_fold();
        img.mount(&env);
        assert_eq!(
            img.handle(Signal::Resize, &env),
            Err(SessionError::Configuration(ConfigurationError::NoSources))
        );
        assert_eq!(img.phase(), Phase::NotEntered);
        assert_eq!(dispatch.pending_count(), 0);
    }

    #[test]
    fn switching_from_original_to_crop_drops_image_sized_canvas() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Original));
        let env = StaticEnvironment::new(500.0, 800.0)
            .with_element(0.0, Geometry::new(400.0, 200.0));
        img.mount(&env);
        img.handle(Signal::Initial, &env).unwrap();
        resolve_all(&dispatch, 800, 400);
        img.poll();
        assert_eq!(img.state().canvas_width, Some(800.0));
        assert_eq!(img.state().canvas_height, Some(400.0));

        img.update_config(breakpoint_config(StretchStrategy::Crop), &env)
            .unwrap();
        assert_eq!(img.state().canvas_width, None);
        assert_eq!(img.state().canvas_height, None);
        // 800x400 in 400x200: same ratio
        assert_eq!(img.state().stretch_state, Some(StretchState::Crop));
    }

    #[test]
    fn losing_every_match_clears_fit_state() {
        let config = FrameConfig {
            sources: vec![ImageSource::new("(min-width: 481px)", "wide.jpg")],
            ..FrameConfig::default()
        };
        let (mut img, dispatch) = session(config);
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        resolve_all(&dispatch, 272, 92);
        img.poll();
        assert_eq!(img.state().stretch_state, Some(StretchState::Original));
        assert_eq!(img.state().canvas_width, Some(272.0));

        let mut narrow = env.clone();
        narrow.media = MediaContext::screen(320.0, 800.0);
        img.handle(Signal::Resize, &narrow).unwrap();
        assert_eq!(img.state().background.as_deref(), Some("url('')"));
        assert!(img.state().error_occurred);
        assert_eq!(img.state().stretch_state, None);
        assert_eq!(img.state().canvas_width, None);
        assert_eq!(img.state().canvas_height, None);
    }

    #[test]
    fn resize_remeasures_position_and_can_enter() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        img.mount(&below_fold());

        // Layout change moved the element up near the fold
        let moved = StaticEnvironment::new(500.0, 800.0).with_element(900.0, Geometry::new(400.0, 300.0));
        img.handle(Signal::Resize, &moved).unwrap();
        assert_eq!(img.phase(), Phase::Entered);
        assert_eq!(img.visibility().element_top, 900.0);
        assert_eq!(dispatch.take_requests().len(), 1);
    }

    #[test]
    fn superseded_probe_cannot_overwrite_state() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Original));
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();

        let mut narrow = env.clone();
        narrow.media = MediaContext::screen(400.0, 800.0);
        img.handle(Signal::Resize, &narrow).unwrap();

        let mut requests = dispatch.take_requests();
        let a = requests.pop().unwrap();
        let b = requests.pop().unwrap();
        assert_eq!((b.request.url.as_str(), a.request.url.as_str()), ("b", "a"));

        a.resolve(Ok(Dimensions { width: 480, height: 320 }));
        img.poll();
        b.resolve(Ok(Dimensions { width: 1400, height: 900 }));
        assert_eq!(img.poll(), None);
        assert_eq!(img.state().canvas_width, Some(480.0));
        assert_eq!(img.state().canvas_height, Some(320.0));
    }

    #[test]
    fn original_strategy_sizes_canvas_to_image() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Original));
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        resolve_all(&dispatch, 272, 92);
        img.poll();
        assert_eq!(img.state().stretch_state, Some(StretchState::Original));
        assert_eq!(img.state().canvas_width, Some(272.0));
        assert_eq!(img.state().canvas_height, Some(92.0));
    }

    #[test]
    fn canvas_ratio_reserves_space_and_drives_crop() {
        let mut config = breakpoint_config(StretchStrategy::Crop);
        config.fit.canvas_ratio = Some(2.0);
        let (mut img, dispatch) = session(config);
        // element not laid out yet: zero height
        let env = StaticEnvironment::new(500.0, 800.0)
            .with_element(3000.0, Geometry::new(400.0, 0.0))
            .scrolled_to(2000.0);
        img.mount(&env);
        assert_eq!(img.state().canvas_height, Some(200.0));
        assert_eq!(img.state().canvas_width, Some(400.0));

        img.handle(Signal::Scroll, &env).unwrap();
        // 240x100 vs reserved 400x200 → 20% → crop at default tolerance
        resolve_all(&dispatch, 240, 100);
        img.poll();
        assert_eq!(img.state().stretch_state, Some(StretchState::Crop));
    }

    #[test]
    fn crop_without_layout_stretches() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        let env = StaticEnvironment::new(500.0, 800.0)
            .with_element(0.0, Geometry::new(400.0, 0.0));
        img.mount(&env);
        img.handle(Signal::Initial, &env).unwrap();
        resolve_all(&dispatch, 800, 600);
        img.poll();
        assert_eq!(img.state().stretch_state, Some(StretchState::Stretch));
    }

    #[test]
    fn load_failure_sets_error_flag() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        for probe in dispatch.take_requests() {
            probe.resolve(Err(BackendError::ProbeFailed("404".into())));
        }
        assert_eq!(img.poll(), Some(LoadOutcome::Failed));
        assert!(!img.state().loading);
        assert!(img.state().error_occurred);
        assert_eq!(img.state().stretch_state, None);
    }

    #[test]
    fn empty_sources_raise_configuration_error_and_recover() {
        let (mut img, dispatch) = session(FrameConfig::default());
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        assert_eq!(
            img.handle(Signal::Scroll, &env),
            Err(SessionError::Configuration(ConfigurationError::NoSources))
        );
        assert_eq!(img.phase(), Phase::Entered);
        assert_eq!(dispatch.pending_count(), 0);

        img.update_config(breakpoint_config(StretchStrategy::Crop), &env)
            .unwrap();
        assert_eq!(dispatch.take_requests()[0].request.url, "b");
    }

    #[test]
    fn no_matching_source_surfaces_error() {
        let config = FrameConfig {
            sources: vec![ImageSource::new("print", "print.jpg")],
            ..FrameConfig::default()
        };
        let (mut img, dispatch) = session(config);
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        assert_eq!(dispatch.pending_count(), 0);
        assert!(img.state().error_occurred);
        assert!(!img.state().loading);
        assert_eq!(img.state().background.as_deref(), Some("url('')"));
    }

    #[test]
    fn metadata_url_overrides_matched_url() {
        let mut config = breakpoint_config(StretchStrategy::Crop);
        config.metadata = Some(crate::types::ImageMetadata {
            keywords: "logo".into(),
            name: "Logo".into(),
            url: "https://example.com/logo".into(),
        });
        let (mut img, _dispatch) = session(config);
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        assert_eq!(
            img.state().matched_url.as_deref(),
            Some("https://example.com/logo")
        );
        assert_eq!(img.state().background.as_deref(), Some("url('b')"));
    }

    #[test]
    fn observers_see_each_change_once() {
        let seen: Rc<RefCell<Vec<RenderState>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Stretch));
        img.subscribe(move |s: &RenderState| sink.borrow_mut().push(s.clone()));

        let env = below_fold();
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap(); // no change
        img.handle(Signal::Scroll, &env.clone().scrolled_to(2000.0)).unwrap();
        resolve_all(&dispatch, 10, 10);
        img.poll();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert!(!seen[0].has_entered_viewport);
        assert!(seen[1].has_entered_viewport && seen[1].loading);
        assert_eq!(seen[2].stretch_state, Some(StretchState::Stretch));
    }

    #[test]
    fn dispose_detaches_pending_probe() {
        let (mut img, dispatch) = session(breakpoint_config(StretchStrategy::Crop));
        let env = below_fold().scrolled_to(2000.0);
        img.mount(&env);
        img.handle(Signal::Scroll, &env).unwrap();
        img.dispose();
        let probe = dispatch.take_requests().pop().unwrap();
        assert!(!probe.resolve(Ok(Dimensions { width: 1, height: 1 })));
    }
}
