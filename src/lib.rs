//! # Lazy Frame
//!
//! The engine behind a lazily loaded, responsive image. Given a list of
//! media-conditioned sources, it decides *when* an image should start loading
//! (as it approaches the viewport), *which* source to load (first media
//! condition that matches), and *how* to fit it into its container once its
//! dimensions are known (crop, stretch, or keep the original size).
//!
//! Rendering is the host's job. This crate only produces a [`types::RenderState`]
//! snapshot for the host to paint and tells it about every change.
//!
//! # Pipeline
//!
//! ```text
//! scroll / resize ─▶ viewport oracle ─▶ session ─▶ source selector ─▶ load controller ─▶ fit classifier
//!                                          │                                                  │
//!                                          └───────────────── RenderState ◀───────────────────┘
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`viewport`] | Loading-area oracle: buffer below the fold, entry test |
//! | [`media`] | Media query parsing and evaluation against a display context |
//! | [`selection`] | First-match source selection and the empty-sources contract |
//! | [`imaging`] | Fit classification, canvas sizing, and probe backends |
//! | [`loader`] | Single-slot probe controller with supersession |
//! | [`session`] | Per-image state machine wiring it all together |
//! | [`config`] | `lazy-frame.toml` loading, validation, stock defaults |
//! | [`types`] | Shared types (`ImageSource`, `Geometry`, `RenderState`, ...) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Single Probe Slot
//!
//! An image only ever cares about one url at a time. The [`loader`] keeps one
//! tracked attempt and tags every probe with a fresh token; completions that
//! arrive for an older token are dropped. Switching breakpoints mid-load can
//! therefore never paint the wrong image's dimensions.
//!
//! ## Probes Off-Thread, State On-Thread
//!
//! Probes may run on the rayon pool or be handed to the host, but results only
//! land when the owner calls `poll`/`wait`. Session state has a single writer
//! and needs no locks.
//!
//! ## Scroll Is Cheap, Resize Is Full
//!
//! A scroll only re-runs the oracle against cached positions, and does nothing
//! once the image has entered. A resize can change everything, so in any phase
//! it re-measures position and canvas, re-selects the source (loading it if the
//! url changed), and reclassifies the fit.
//!
//! # Quick Example
//!
//! ```
//! use lazy_frame::config::FrameConfig;
//! use lazy_frame::loader::DeferredDispatch;
//! use lazy_frame::session::{LazyImage, Signal, StaticEnvironment};
//! use lazy_frame::types::{Geometry, ImageSource};
//!
//! let config = FrameConfig {
//!     sources: vec![
//!         ImageSource::new("(max-width: 480px)", "small.jpg"),
//!         ImageSource::new("(min-width: 481px)", "large.jpg"),
//!     ],
//!     ..FrameConfig::default()
//! };
//! let dispatch = DeferredDispatch::new();
//! let mut image = LazyImage::new(config, dispatch.clone());
//!
//! let env = StaticEnvironment::new(1024.0, 768.0).with_element(100.0, Geometry::new(600.0, 400.0));
//! image.mount(&env);
//! image.handle(Signal::Initial, &env).unwrap();
//! assert_eq!(dispatch.take_requests()[0].request.url, "large.jpg");
//! ```

pub mod config;
pub mod imaging;
pub mod loader;
pub mod media;
pub mod output;
pub mod selection;
pub mod session;
pub mod types;
pub mod viewport;
