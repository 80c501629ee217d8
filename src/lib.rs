//! Layer compositing core for an image editor: an ordered layer stack,
//! pixel-wise mask algebra, alpha compositing and flattening, a drawing
//! overlay that turns pointer gestures into new layers, and a renderer for
//! labeled detection boxes.
//!
//! Everything here is headless. A front-end feeds pointer events and
//! rasters in; the engine hands `RgbaImage`s back.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;
pub mod viewport;

pub use canvas::{BlendMode, Layer, LayerId, LayerKind, LayerPixels};
pub use components::layers::{LayerPatch, LayerStore};
pub use components::tools::{CommitOutcome, DrawingOverlay, PointerButton, PointerEvent, Tool};
pub use error::{EngineError, EngineResult};
pub use ops::annotate::{AnnotationStyle, DetectionBox, NormalizedBox, Segment};
pub use ops::mask::MaskOp;
pub use project::Project;
pub use viewport::{CoordinateMapper, SurfaceRect, Viewport};
