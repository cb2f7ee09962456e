use bitos::integer::u5;
use gx::attr::{
    AttributeMode, ColorDescriptor, ColorFormat, CoordFormat, NormalDescriptor,
    PositionDescriptor, TexCoordDescriptor, VertexAttributeTable,
};
use gx::{Arrays, VertexDescriptor};
use jitmem::CodeBuffer;

use crate::decl::VertexDeclaration;
use crate::scale::ScaleTable;

/// Wide attribute loads may read up to this many bytes past the last
/// attribute of the last vertex. Source buffers (and indexed arrays) must
/// carry this much trailing slack.
pub const SRC_READ_SLACK: usize = 4;

/// Everything a generated loader reads besides the source stream. Built on
/// the stack for each batch, so the routine itself touches no global state.
#[repr(C)]
pub struct DecodeContext {
    pub arrays: Arrays,
    /// The live matrix index register; masked to its low 6 bits by the
    /// generated code when the stream carries no position matrix index.
    pub matrix_index_a: u32,
    pub scale: ScaleTable,
}

impl DecodeContext {
    pub fn new(arrays: Arrays, matrix_index_a: u32) -> Self {
        Self {
            arrays,
            matrix_index_a,
            scale: ScaleTable::new(),
        }
    }
}

/// Key for the loader cache: one generated routine per unique pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    pub vcd: VertexDescriptor,
    pub vat: VertexAttributeTable,
}

impl Config {
    /// Normalizes attribute table state that cannot reach the generated code,
    /// so that descriptors differing only in dead fields share a routine.
    /// Semantics are untouched: the builder never reads the cleared fields.
    pub fn canonicalize(mut self) -> Self {
        if self.vcd.position().is_present() {
            if self.vat.a.position().format() == CoordFormat::F32 {
                let desc = self.vat.a.position().with_shift(u5::new(0));
                self.vat.a = self.vat.a.with_position(desc);
            }
        } else {
            self.vat.a = self.vat.a.with_position(PositionDescriptor::default());
        }

        if !self.vcd.normal().is_present() {
            self.vat.a = self
                .vat
                .a
                .with_normal(NormalDescriptor::default())
                .with_normal_index3(false);
        }

        if !self.vcd.chan0().is_present() {
            self.vat.a = self.vat.a.with_chan0(ColorDescriptor::default());
        }

        if !self.vcd.chan1().is_present() {
            self.vat.a = self.vat.a.with_chan1(ColorDescriptor::default());
        }

        for i in 0..8 {
            if self.vcd.tex(i).is_present() {
                let desc = self.vat.tex(i).unwrap();
                if desc.format() == CoordFormat::F32 {
                    self.vat = self.vat.with_tex(i, desc.with_shift(u5::new(0)));
                }
            } else {
                self.vat = self.vat.with_tex(i, TexCoordDescriptor::default());
            }
        }

        let mut any_quantized = self.vcd.position().is_present()
            && self.vat.a.position().format() != CoordFormat::F32;
        for i in 0..8 {
            any_quantized |= self.vcd.tex(i).is_present()
                && self.vat.tex(i).unwrap().format() != CoordFormat::F32;
        }
        if !any_quantized {
            self.vat.a = self.vat.a.with_byte_dequant(false);
        }

        self
    }

    /// A short human-readable name for logs and profiling.
    pub fn name(&self) -> String {
        fn mode(mode: AttributeMode) -> &'static str {
            match mode {
                AttributeMode::None => "n",
                AttributeMode::Direct => "d",
                AttributeMode::Index8 => "x8",
                AttributeMode::Index16 => "x16",
            }
        }

        fn coord(format: CoordFormat) -> &'static str {
            match format {
                CoordFormat::U8 => "u8",
                CoordFormat::I8 => "i8",
                CoordFormat::U16 => "u16",
                CoordFormat::I16 => "i16",
                CoordFormat::F32 => "f32",
                _ => "rsv",
            }
        }

        fn color(format: ColorFormat) -> &'static str {
            match format {
                ColorFormat::Rgb565 => "565",
                ColorFormat::Rgb888 => "888",
                ColorFormat::Rgb888x => "888x",
                ColorFormat::Rgba4444 => "4444",
                ColorFormat::Rgba6666 => "6666",
                ColorFormat::Rgba8888 => "8888",
                _ => "rsv",
            }
        }

        let mut name = String::new();
        if self.vcd.pos_mat_index() {
            name.push_str("pm_");
        }
        for i in 0..8 {
            if self.vcd.tex_mat(i) {
                name.push_str(&format!("tm{i}_"));
            }
        }
        if self.vcd.position().is_present() {
            let desc = self.vat.a.position();
            name.push_str(&format!(
                "p{}{}_{}_",
                desc.elements(),
                coord(desc.format()),
                mode(self.vcd.position())
            ));
        }
        if self.vcd.normal().is_present() {
            let desc = self.vat.a.normal();
            name.push_str(&format!(
                "n{}{}_{}_",
                desc.vectors(),
                coord(desc.format()),
                mode(self.vcd.normal())
            ));
        }
        for (i, chan) in [self.vcd.chan0(), self.vcd.chan1()].into_iter().enumerate() {
            if chan.is_present() {
                let desc = if i == 0 {
                    self.vat.a.chan0()
                } else {
                    self.vat.a.chan1()
                };
                name.push_str(&format!("c{i}{}_{}_", color(desc.format()), mode(chan)));
            }
        }
        for i in 0..8 {
            if self.vcd.tex(i).is_present() {
                let desc = self.vat.tex(i).unwrap();
                name.push_str(&format!(
                    "t{i}{}{}_{}_",
                    desc.elements(),
                    coord(desc.format()),
                    mode(self.vcd.tex(i))
                ));
            }
        }

        name.pop();
        if name.is_empty() {
            name.push_str("empty");
        }

        name
    }
}

// src, dst, count, context
pub type LoaderFn = extern "C" fn(*const u8, *mut u8, u32, *const DecodeContext) -> u32;

/// Meta information regarding a generated loader.
#[derive(Debug, Clone)]
pub struct Meta {
    /// Derived from the config; stable across regenerations.
    pub name: String,
    /// The Cranelift IR of the routine. Only available in test builds.
    pub clir: Option<String>,
    /// The disassembly of the routine. Only available in test builds.
    pub disasm: Option<String>,
}

/// A compiled vertex loader for a single descriptor pair.
pub struct VertexLoader {
    code: CodeBuffer,
    decl: VertexDeclaration,
    vertex_size: u32,
    meta: Meta,
}

impl VertexLoader {
    pub(crate) fn new(
        code: CodeBuffer,
        decl: VertexDeclaration,
        vertex_size: u32,
        meta: Meta,
    ) -> Self {
        Self {
            code,
            decl,
            vertex_size,
            meta,
        }
    }

    /// The entry point of the generated routine.
    pub fn as_fn(&self) -> LoaderFn {
        // SAFETY: the buffer holds a finished routine with this signature
        unsafe { std::mem::transmute(self.code.as_ptr()) }
    }

    pub fn declaration(&self) -> &VertexDeclaration {
        &self.decl
    }

    /// Source bytes consumed per input vertex.
    pub fn vertex_size(&self) -> u32 {
        self.vertex_size
    }

    /// Destination bytes written per emitted vertex.
    pub fn native_stride(&self) -> u32 {
        self.decl.stride
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }
}
