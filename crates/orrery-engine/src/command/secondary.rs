use std::ops::Range;

use crate::coords::{Extent, Viewport};
use crate::device::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, PipelineHandle, RenderPassHandle,
};

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    SetViewport(Viewport),
    SetScissor {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    BindPipeline(PipelineHandle),
    BindVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    BindDescriptorSet {
        index: u32,
        set: DescriptorSetHandle,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
}

/// Recording lifecycle of a secondary.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecordState {
    /// Allocated, never recorded (or reset).
    Initial,
    /// `begin` was called and `end` has not been reached.
    Recording,
    Executable,
}

/// Render pass state inherited from the primary command buffer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Inheritance {
    pub render_pass: RenderPassHandle,
    pub viewport: Viewport,
    pub extent: Extent,
}

/// Everything a recording baked in. A secondary whose key differs from the
/// renderable's current one must be re-recorded before it is executed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RecordKey {
    pub pipeline: PipelineHandle,
    pub vertex_buffer: Option<BufferHandle>,
    pub descriptor_set: Option<DescriptorSetHandle>,
    pub extent: Extent,
    pub vertex_count: u32,
}

/// A secondary command buffer bound to one swapchain image.
#[derive(Debug)]
pub struct SecondaryCommandBuffer {
    handle: CommandBufferHandle,
    state: RecordState,
    commands: Vec<DrawCommand>,
    inheritance: Option<Inheritance>,
    recorded_with: Option<RecordKey>,
}

impl SecondaryCommandBuffer {
    pub fn new(handle: CommandBufferHandle) -> Self {
        Self {
            handle,
            state: RecordState::Initial,
            commands: Vec::new(),
            inheritance: None,
            recorded_with: None,
        }
    }

    #[inline]
    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    #[inline]
    pub fn state(&self) -> RecordState {
        self.state
    }

    #[inline]
    pub fn is_executable(&self) -> bool {
        self.state == RecordState::Executable
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn inheritance(&self) -> Option<&Inheritance> {
        self.inheritance.as_ref()
    }

    /// Number of draw calls, empty draws included.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Draw { .. }))
            .count()
    }

    pub fn recorded_with(&self) -> Option<&RecordKey> {
        self.recorded_with.as_ref()
    }

    pub fn needs_recording(&self, key: &RecordKey) -> bool {
        !self.is_executable() || self.recorded_with.as_ref() != Some(key)
    }

    /// Drops previous contents and starts a new recording.
    pub fn begin(&mut self, inheritance: Inheritance) -> CommandRecorder<'_> {
        self.commands.clear();
        self.state = RecordState::Recording;
        self.inheritance = Some(inheritance);
        self.recorded_with = None;
        CommandRecorder { target: self }
    }

    pub fn reset(&mut self) {
        self.commands.clear();
        self.state = RecordState::Initial;
        self.inheritance = None;
        self.recorded_with = None;
    }
}

/// Open recording. Dropping it without [`end`](Self::end) leaves the
/// secondary non-executable.
#[derive(Debug)]
pub struct CommandRecorder<'a> {
    target: &'a mut SecondaryCommandBuffer,
}

impl CommandRecorder<'_> {
    pub fn set_viewport(&mut self, viewport: Viewport) -> &mut Self {
        self.target.commands.push(DrawCommand::SetViewport(viewport));
        self
    }

    pub fn set_scissor(&mut self, extent: Extent) -> &mut Self {
        self.target.commands.push(DrawCommand::SetScissor {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        });
        self
    }

    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> &mut Self {
        self.target.commands.push(DrawCommand::BindPipeline(pipeline));
        self
    }

    pub fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) -> &mut Self {
        self.target
            .commands
            .push(DrawCommand::BindVertexBuffer { slot, buffer });
        self
    }

    pub fn bind_descriptor_set(&mut self, index: u32, set: DescriptorSetHandle) -> &mut Self {
        self.target
            .commands
            .push(DrawCommand::BindDescriptorSet { index, set });
        self
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> &mut Self {
        self.target
            .commands
            .push(DrawCommand::Draw { vertices, instances });
        self
    }

    pub fn end(self, key: RecordKey) {
        self.target.state = RecordState::Executable;
        self.target.recorded_with = Some(key);
    }
}
