//! GX command processor vertex state.
pub mod attr;

use bitos::bitos;

use crate::attr::AttributeMode;

/// Describes which attributes are present in the vertices of a primitive
/// stream and how they are encoded.
#[bitos(64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexDescriptor {
    /// Whether the position/normal matrix index is present.
    #[bits(0)]
    pub pos_mat_index: bool,
    /// Whether the texture coordinate matrix N index is present.
    #[bits(1..9)]
    pub tex_mat_index: [bool; 8],
    /// How the position attribute is present.
    #[bits(9..11)]
    pub position: AttributeMode,
    /// How the normal attribute is present.
    #[bits(11..13)]
    pub normal: AttributeMode,
    /// How the color channel 0 attribute is present.
    #[bits(13..15)]
    pub chan0: AttributeMode,
    /// How the color channel 1 attribute is present.
    #[bits(15..17)]
    pub chan1: AttributeMode,
    /// How the texture coordinate N attribute is present.
    #[bits(32..48)]
    pub tex_coord: [AttributeMode; 8],
}

impl VertexDescriptor {
    /// Mode of texture coordinate `index`.
    pub fn tex(&self, index: usize) -> AttributeMode {
        self.tex_coord_at(index).unwrap()
    }

    /// Whether the texture matrix index for slot `index` is present.
    pub fn tex_mat(&self, index: usize) -> bool {
        self.tex_mat_index_at(index).unwrap()
    }

    pub fn with_tex(self, index: usize, mode: AttributeMode) -> Self {
        assert!(index < 8);
        let shift = 32 + 2 * index as u64;
        Self::from_bits((self.to_bits() & !(0b11 << shift)) | ((mode as u64) << shift))
    }

    pub fn with_tex_mat(self, index: usize, present: bool) -> Self {
        assert!(index < 8);
        let bit = 1u64 << (1 + index as u64);
        let bits = if present {
            self.to_bits() | bit
        } else {
            self.to_bits() & !bit
        };

        Self::from_bits(bits)
    }
}

/// A vertex attribute array in host memory. Indexed attributes resolve to
/// `base + index * stride`.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ArrayBinding {
    pub base: *const u8,
    pub stride: u32,
}

impl ArrayBinding {
    pub const fn empty() -> Self {
        Self {
            base: std::ptr::null(),
            stride: 0,
        }
    }
}

impl Default for ArrayBinding {
    fn default() -> Self {
        Self::empty()
    }
}

/// The attribute array table: one binding per indexable attribute.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Arrays {
    pub position: ArrayBinding,
    pub normal: ArrayBinding,
    pub chan0: ArrayBinding,
    pub chan1: ArrayBinding,
    pub tex_coords: [ArrayBinding; 8],
}
