use std::{cell::RefCell, rc::Rc};

use serde::Serialize;

use crate::{Result, TabVizError};

/// Shared handle behaviors receive at construction so they can draw without
/// reaching for a global application instance.
pub type CanvasHandle = Rc<RefCell<FrameCanvas>>;

/// Layer a draw command belongs to. GUI commands come from the `draw_gui`
/// pass and sit above world commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layer {
    World,
    Gui,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawCommand {
    pub layer: Layer,
    pub source: String,
    pub text: String,
}

/// Text rendering backend. Collects the commands issued between
/// [`begin_frame`][Self::begin_frame] and [`end_frame`][Self::end_frame] and
/// keeps the last completed frame around for presentation.
#[derive(Debug, Default)]
pub struct FrameCanvas {
    in_frame: bool,
    pending: Vec<DrawCommand>,
    presented: Vec<DrawCommand>,
    frames: u64,
}

impl FrameCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> CanvasHandle {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn begin_frame(&mut self) -> Result<()> {
        if self.in_frame {
            return Err(TabVizError::msg("canvas frame already started"));
        }
        self.in_frame = true;
        self.pending.clear();
        Ok(())
    }

    pub fn draw_text(
        &mut self,
        layer: Layer,
        source: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<()> {
        if !self.in_frame {
            return Err(TabVizError::msg("draw issued outside of a canvas frame"));
        }
        self.pending.push(DrawCommand {
            layer,
            source: source.into(),
            text: text.into(),
        });
        Ok(())
    }

    /// Finishes the frame and returns the commands it collected.
    pub fn end_frame(&mut self) -> Result<&[DrawCommand]> {
        if !self.in_frame {
            return Err(TabVizError::msg("canvas frame was never started"));
        }
        self.in_frame = false;
        self.presented = std::mem::take(&mut self.pending);
        self.frames += 1;
        Ok(&self.presented)
    }

    pub fn is_in_frame(&self) -> bool {
        self.in_frame
    }

    /// Commands of the last completed frame.
    pub fn presented(&self) -> &[DrawCommand] {
        &self.presented
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }
}
