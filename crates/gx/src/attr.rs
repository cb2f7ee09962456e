//! Vertex attribute descriptors and the attribute table registers.
use bitos::bitos;
use bitos::integer::u5;

/// The mode of an attribute: absent, inline in the stream, or reached through
/// an index into the attribute's array.
#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeMode {
    /// Not present.
    #[default]
    None    = 0b00,
    /// Directly in the vertex attribute stream.
    Direct  = 0b01,
    /// Through an 8 bit index in the vertex attribute stream.
    Index8  = 0b10,
    /// Through a 16 bit big-endian index in the vertex attribute stream.
    Index16 = 0b11,
}

impl AttributeMode {
    pub fn is_present(self) -> bool {
        self != AttributeMode::None
    }

    pub fn is_indexed(self) -> bool {
        matches!(self, Self::Index8 | Self::Index16)
    }
}

/// Encoding of a single coordinate component.
#[bitos(3)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordFormat {
    #[default]
    U8        = 0b000,
    I8        = 0b001,
    U16       = 0b010,
    I16       = 0b011,
    F32       = 0b100,
    Reserved0 = 0b101,
    Reserved1 = 0b110,
    Reserved2 = 0b111,
}

impl CoordFormat {
    /// Size of one component in the stream, in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::F32 => 4,
            _ => panic!("reserved format"),
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16)
    }
}

#[bitos(1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionKind {
    /// Two components (x, y).
    #[default]
    Vec2 = 0b0,
    /// Three components (x, y, z).
    Vec3 = 0b1,
}

#[bitos(9)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionDescriptor {
    #[bits(0)]
    pub kind: PositionKind,
    #[bits(1..4)]
    pub format: CoordFormat,
    #[bits(4..9)]
    pub shift: u5,
}

impl PositionDescriptor {
    /// Components present in the stream.
    pub fn elements(&self) -> u32 {
        match self.kind() {
            PositionKind::Vec2 => 2,
            PositionKind::Vec3 => 3,
        }
    }
}

#[bitos(1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalCount {
    /// A single normal.
    #[default]
    Single = 0b0,
    /// Normal, binormal and tangent.
    Nbt    = 0b1,
}

#[bitos(4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalDescriptor {
    #[bits(0)]
    pub count: NormalCount,
    #[bits(1..4)]
    pub format: CoordFormat,
}

impl NormalDescriptor {
    /// How many 3-component vectors the attribute carries.
    pub fn vectors(&self) -> u32 {
        match self.count() {
            NormalCount::Single => 1,
            NormalCount::Nbt => 3,
        }
    }
}

#[bitos(1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorKind {
    /// Three components (r, g, b).
    #[default]
    Rgb  = 0b0,
    /// Four components (r, g, b, a).
    Rgba = 0b1,
}

#[bitos(3)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorFormat {
    #[default]
    Rgb565    = 0b000,
    Rgb888    = 0b001,
    Rgb888x   = 0b010,
    Rgba4444  = 0b011,
    Rgba6666  = 0b100,
    Rgba8888  = 0b101,
    Reserved0 = 0b110,
    Reserved1 = 0b111,
}

impl ColorFormat {
    /// Size of the color in the stream, in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Rgb565 | Self::Rgba4444 => 2,
            Self::Rgb888 | Self::Rgba6666 => 3,
            Self::Rgb888x | Self::Rgba8888 => 4,
            _ => panic!("reserved format"),
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba4444 | Self::Rgba6666 | Self::Rgba8888)
    }
}

#[bitos(4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorDescriptor {
    #[bits(0)]
    pub kind: ColorKind,
    #[bits(1..4)]
    pub format: ColorFormat,
}

#[bitos(1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexCoordKind {
    /// One component (s).
    #[default]
    S  = 0b0,
    /// Two components (s, t).
    St = 0b1,
}

#[bitos(9)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TexCoordDescriptor {
    #[bits(0)]
    pub kind: TexCoordKind,
    #[bits(1..4)]
    pub format: CoordFormat,
    #[bits(4..9)]
    pub shift: u5,
}

impl TexCoordDescriptor {
    /// Components present in the stream.
    pub fn elements(&self) -> u32 {
        match self.kind() {
            TexCoordKind::S => 1,
            TexCoordKind::St => 2,
        }
    }
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeTableA {
    #[bits(0..9)]
    pub position: PositionDescriptor,
    #[bits(9..13)]
    pub normal: NormalDescriptor,
    #[bits(13..17)]
    pub chan0: ColorDescriptor,
    #[bits(17..21)]
    pub chan1: ColorDescriptor,
    #[bits(21..30)]
    pub tex0: TexCoordDescriptor,
    #[bits(30)]
    pub byte_dequant: bool,
    #[bits(31)]
    pub normal_index3: bool,
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeTableB {
    #[bits(0..27)]
    pub tex1to3: [TexCoordDescriptor; 3],

    #[bits(27)]
    pub tex4_kind: TexCoordKind,
    #[bits(28..31)]
    pub tex4_format: CoordFormat,

    #[bits(31)]
    pub vcache_enhance: bool,
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeTableC {
    #[bits(0..5)]
    pub tex4_shift: u5,
    #[bits(5..32)]
    pub tex5to7: [TexCoordDescriptor; 3],
}

/// One of the eight vertex attribute tables. The tex4 descriptor is split
/// across groups B and C by the hardware layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeTable {
    pub a: VertexAttributeTableA,
    pub b: VertexAttributeTableB,
    pub c: VertexAttributeTableC,
}

impl VertexAttributeTable {
    /// Descriptor of texture coordinate `index`.
    pub fn tex(&self, index: usize) -> Option<TexCoordDescriptor> {
        Some(match index {
            0 => self.a.tex0(),
            1..4 => self.b.tex1to3_at(index - 1).unwrap(),
            4 => TexCoordDescriptor::default()
                .with_kind(self.b.tex4_kind())
                .with_format(self.b.tex4_format())
                .with_shift(self.c.tex4_shift()),
            5..8 => self.c.tex5to7_at(index - 5).unwrap(),
            _ => return None,
        })
    }

    pub fn with_tex(mut self, index: usize, desc: TexCoordDescriptor) -> Self {
        let raw = desc.to_bits().value() as u32;
        match index {
            0 => self.a = self.a.with_tex0(desc),
            1..4 => {
                let shift = 9 * (index as u32 - 1);
                self.b = VertexAttributeTableB::from_bits(
                    (self.b.to_bits() & !(0x1FF << shift)) | (raw << shift),
                );
            }
            4 => {
                self.b = self
                    .b
                    .with_tex4_kind(desc.kind())
                    .with_tex4_format(desc.format());
                self.c = self.c.with_tex4_shift(desc.shift());
            }
            5..8 => {
                let shift = 5 + 9 * (index as u32 - 5);
                self.c = VertexAttributeTableC::from_bits(
                    (self.c.to_bits() & !(0x1FF << shift)) | (raw << shift),
                );
            }
            _ => panic!("texture coordinate index out of range"),
        }

        self
    }
}
