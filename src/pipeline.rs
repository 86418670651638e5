// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pipeline descriptions.
//!
//! Shaders arrive already compiled for the target backend (SPIR-V, DXIL or a Metal library);
//! this crate treats them as opaque bytes.

use crate::resources::{CompareOp, Format};

/// A compiled shader for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBlob {
    pub bytes: Vec<u8>,
    pub entry_point: String,
}

impl ShaderBlob {
    pub fn new(bytes: impl Into<Vec<u8>>, entry_point: &str) -> Self {
        ShaderBlob {
            bytes: bytes.into(),
            entry_point: entry_point.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepMode {
    #[default]
    Vertex,
    Instance,
}

/// One vertex attribute, named by its HLSL semantic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputElement {
    pub semantic: String,
    pub semantic_index: u32,
    pub format: Format,
    /// Vertex buffer slot the attribute is read from.
    pub buffer_slot: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub slot: u32,
    pub stride: u32,
    pub step: StepMode,
}

/// Vertex input description produced by shader reflection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputLayoutDesc {
    pub elements: Vec<InputElement>,
    pub buffers: Vec<VertexBufferLayout>,
}

impl InputLayoutDesc {
    pub fn element(mut self, semantic: &str, semantic_index: u32, format: Format, buffer_slot: u32, offset: u32) -> Self {
        self.elements.push(InputElement {
            semantic: semantic.to_string(),
            semantic_index,
            format,
            buffer_slot,
            offset,
        });
        self
    }

    pub fn buffer(mut self, slot: u32, stride: u32, step: StepMode) -> Self {
        self.buffers.push(VertexBufferLayout { slot, stride, step });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub format: Format,
    pub write: bool,
    pub compare: CompareOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTarget {
    pub format: Format,
    pub blend: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsPipelineDesc {
    pub vertex: ShaderBlob,
    pub pixel: Option<ShaderBlob>,
    pub input_layout: InputLayoutDesc,
    pub topology: PrimitiveTopology,
    pub cull: CullMode,
    pub color_targets: Vec<ColorTarget>,
    pub depth: Option<DepthState>,
    pub samples: u32,
    pub debug_name: String,
}

impl GraphicsPipelineDesc {
    pub fn new(debug_name: &str, vertex: ShaderBlob, pixel: ShaderBlob, color_format: Format) -> Self {
        GraphicsPipelineDesc {
            vertex,
            pixel: Some(pixel),
            input_layout: InputLayoutDesc::default(),
            topology: PrimitiveTopology::TriangleList,
            cull: CullMode::None,
            color_targets: vec![ColorTarget {
                format: color_format,
                blend: false,
            }],
            depth: None,
            samples: 1,
            debug_name: debug_name.to_string(),
        }
    }
    pub fn with_input_layout(mut self, layout: InputLayoutDesc) -> Self {
        self.input_layout = layout;
        self
    }
    pub fn with_depth(mut self, depth: DepthState) -> Self {
        self.depth = Some(depth);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePipelineDesc {
    pub compute: ShaderBlob,
    pub debug_name: String,
}

impl ComputePipelineDesc {
    pub fn new(debug_name: &str, compute: ShaderBlob) -> Self {
        ComputePipelineDesc {
            compute,
            debug_name: debug_name.to_string(),
        }
    }
}

/// Which bind point a pipeline (and the state bound for it) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

impl PipelineKind {
    pub(crate) const fn index(self) -> usize {
        match self {
            PipelineKind::Graphics => 0,
            PipelineKind::Compute => 1,
        }
    }
}
