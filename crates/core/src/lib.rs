//! Core library for the Tab Visualiser application.
//!
//! Everything that runs once per frame is a [`Behavior`] registered with a
//! [`BehaviorManager`], which dispatches the frame passes by descending
//! priority and isolates faults per behavior. The remaining modules supply
//! the pieces a practice session needs around that scheduler:
//!
//! - [`audio`]: sample sources and the input monitor behavior
//! - [`analysis`]: FFT pitch detection over guitar range notes
//! - [`playback`]: the track cursor that follows song time and tempo
//! - [`render`]: the text canvas behaviors draw into
//! - [`host`]: the fixed-step frame driver
//! - [`config`], [`timeline`], [`error`]: shared plumbing
//!
//! ```
//! use tabviz_core::{shared, Behavior, BehaviorCore, BehaviorManager, FrameTime, Result};
//!
//! struct Ticker {
//!     core: BehaviorCore,
//!     ticks: u32,
//! }
//!
//! impl Behavior for Ticker {
//!     fn core(&self) -> &BehaviorCore { &self.core }
//!     fn core_mut(&mut self) -> &mut BehaviorCore { &mut self.core }
//!
//!     fn update(&mut self, _time: &FrameTime) -> Result<()> {
//!         self.ticks += 1;
//!         Ok(())
//!     }
//! }
//!
//! let ticker = shared(Ticker { core: BehaviorCore::new("ticker"), ticks: 0 });
//! let mut manager = BehaviorManager::new();
//! manager.add(ticker.clone())?;
//! manager.update(&FrameTime::default());
//! assert_eq!(ticker.borrow().ticks, 1);
//! # Ok::<(), tabviz_core::TabVizError>(())
//! ```

pub mod analysis;
pub mod audio;
pub mod behavior;
pub mod config;
pub mod error;
pub mod host;
pub mod playback;
pub mod render;
pub mod timeline;

pub use analysis::{Note, NoteDetector, Peak};
pub use audio::{InputMonitor, SampleSource, SilenceSource, ToneSource};
pub use behavior::{
    same_behavior, shared, Behavior, BehaviorCore, BehaviorHandle, BehaviorId, BehaviorManager,
    BehaviorRef, BehaviorSource, Lifecycle, Priority, PriorityGroup, WeakBehaviorRef,
};
pub use config::{AppConfig, AudioConfig, FrameConfig, PlaybackConfig};
pub use error::{Result, TabVizError};
pub use host::FrameHost;
pub use playback::TrackCursor;
pub use render::{CanvasHandle, DrawCommand, FrameCanvas, Layer};
pub use timeline::{FrameTime, PlaybackClock};
