//! Specializing JIT vertex decoder for the GX command processor.
//!
//! Each unique (vertex descriptor, attribute table) pair compiles, once, into
//! a straight-line native routine that unpacks a big-endian attribute stream
//! into the packed little-endian layout described by its
//! [`VertexDeclaration`](decl::VertexDeclaration).
mod builder;
pub mod decl;
pub mod isa;
mod loader;
pub mod scale;

#[cfg(test)]
mod test;

use std::collections::hash_map::Entry;
use std::sync::Arc;

use cranelift::codegen::isa::TargetIsa;
use cranelift::codegen::settings::Configurable;
use cranelift::codegen::{self, ir};
use cranelift::prelude::isa as isa_builder;
use cranelift::{frontend, native};
use gx::attr::VertexAttributeTable;
use gx::{Arrays, VertexDescriptor};
use jitmem::CodeBuffer;
use rustc_hash::FxHashMap;

use crate::builder::LoaderBuilder;
pub use crate::loader::{
    Config, DecodeContext, LoaderFn, Meta, SRC_READ_SLACK, VertexLoader,
};

/// Whether the generated decoders can run at all in the current environment:
/// with bounding box tracking active, the backend must compute it in
/// hardware, because the routines do not.
pub fn environment_is_supported(hardware_bbox: bool, bbox_active: bool) -> bool {
    hardware_bbox || !bbox_active
}

struct Codegen {
    isa: Arc<dyn TargetIsa>,
}

impl Codegen {
    fn with_isa(isa: isa_builder::Builder) -> Self {
        let verifier = if cfg!(debug_assertions) {
            "true"
        } else {
            "false"
        };

        let mut codegen = codegen::settings::builder();
        codegen.set("preserve_frame_pointers", "true").unwrap();
        codegen.set("use_colocated_libcalls", "false").unwrap();
        codegen.set("stack_switch_model", "basic").unwrap();
        codegen.set("unwind_info", "false").unwrap();
        codegen.set("is_pic", "false").unwrap();

        // affect runtime performance
        codegen.set("opt_level", "speed").unwrap();
        codegen.set("enable_verifier", verifier).unwrap();
        codegen.set("enable_alias_analysis", "true").unwrap();
        codegen.set("regalloc_algorithm", "backtracking").unwrap();
        codegen.set("regalloc_checker", "false").unwrap();
        codegen.set("enable_pinned_reg", "false").unwrap();
        codegen
            .set("enable_heap_access_spectre_mitigation", "false")
            .unwrap();
        codegen
            .set("enable_table_access_spectre_mitigation", "false")
            .unwrap();

        let isa = isa.finish(codegen::settings::Flags::new(codegen)).unwrap();

        Codegen { isa }
    }

    fn new() -> Self {
        let isa = native::builder().unwrap_or_else(|msg| {
            panic!("host machine is not supported: {}", msg);
        });

        Self::with_isa(isa)
    }

    fn loader_signature(&self) -> ir::Signature {
        let ptr = self.isa.pointer_type();
        ir::Signature {
            // src, dst, count, context
            params: vec![
                ir::AbiParam::new(ptr),
                ir::AbiParam::new(ptr),
                ir::AbiParam::new(ir::types::I32),
                ir::AbiParam::new(ptr),
            ],
            // emitted vertices
            returns: vec![ir::AbiParam::new(ir::types::I32)],
            call_conv: self.isa.default_call_conv(),
        }
    }

    /// Compiles and returns a loader.
    fn compile(
        &self,
        code_ctx: &mut codegen::Context,
        func_ctx: &mut frontend::FunctionBuilderContext,
        config: Config,
    ) -> VertexLoader {
        let mut func = ir::Function::new();
        func.signature = self.loader_signature();

        let func_builder = frontend::FunctionBuilder::new(&mut func, func_ctx);
        let builder = LoaderBuilder::new(self, func_builder, config);
        let output = builder.build();

        let clir = cfg!(test).then(|| func.display().to_string());
        code_ctx.clear();
        code_ctx.want_disasm = cfg!(test);
        code_ctx.func = func;
        code_ctx
            .compile(&*self.isa, &mut Default::default())
            .unwrap();

        let compiled = code_ctx.take_compiled_code().unwrap();

        // these routines never reference external symbols
        assert!(
            compiled.buffer.relocs().is_empty(),
            "generated loader requested relocations"
        );

        let code = CodeBuffer::new(compiled.code_buffer());
        let disasm = compiled.vcode;
        let meta = Meta {
            name: config.name(),
            clir,
            disasm,
        };

        tracing::debug!(
            name = %meta.name,
            vertex_size = output.vertex_size,
            stride = output.decl.stride,
            code_bytes = code.len(),
            "compiled vertex loader"
        );

        VertexLoader::new(code, output.decl, output.vertex_size, meta)
    }
}

/// Compiles and caches one native loader per descriptor pair, and drives
/// vertex batches through them.
pub struct JitVertexLoader {
    codegen: Codegen,
    code_ctx: codegen::Context,
    func_ctx: frontend::FunctionBuilderContext,
    loaders: FxHashMap<Config, VertexLoader>,
    total_vertices: u64,
}

unsafe impl Send for JitVertexLoader {}

impl JitVertexLoader {
    /// Whether the host has a native code generator. Hosts without one must
    /// pick a different decoder entirely; constructing a [`JitVertexLoader`]
    /// on them panics.
    pub fn is_supported() -> bool {
        native::builder().is_ok()
    }

    pub fn new() -> Self {
        Self {
            codegen: Codegen::new(),
            code_ctx: codegen::Context::new(),
            func_ctx: frontend::FunctionBuilderContext::new(),
            loaders: FxHashMap::default(),
            total_vertices: 0,
        }
    }

    /// The loader for a descriptor pair, compiling it on first use.
    pub fn loader(
        &mut self,
        vcd: &VertexDescriptor,
        vat: &VertexAttributeTable,
    ) -> &VertexLoader {
        let config = Config {
            vcd: *vcd,
            vat: *vat,
        }
        .canonicalize();

        match self.loaders.entry(config) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let loader = self
                    .codegen
                    .compile(&mut self.code_ctx, &mut self.func_ctx, config);

                v.insert(loader)
            }
        }
    }

    /// Decodes `count` vertices from `src` into `dst` and returns how many
    /// were emitted; indexed-position vertices carrying the all-ones sentinel
    /// advance the source but produce no record.
    ///
    /// `src` must hold `count * vertex_size` stream bytes plus
    /// [`SRC_READ_SLACK`] trailing bytes (wide loads read past the last
    /// attribute); both buffer bounds are asserted.
    ///
    /// # Safety
    /// Every array referenced by an indexed attribute must be bound in
    /// `arrays` and stay readable for every index the stream can produce,
    /// with the same trailing slack.
    pub unsafe fn run_vertices(
        &mut self,
        vcd: &VertexDescriptor,
        vat: &VertexAttributeTable,
        arrays: &Arrays,
        matrix_index_a: u32,
        src: &[u8],
        dst: &mut [u8],
        count: u32,
    ) -> u32 {
        let loader = self.loader(vcd, vat);
        let vertex_size = loader.vertex_size() as usize;
        let stride = loader.native_stride() as usize;
        let components = loader.declaration().components;
        let func = loader.as_fn();

        assert!(src.len() >= count as usize * vertex_size + SRC_READ_SLACK);
        assert!(dst.len() >= count as usize * stride);

        let mut ctx = DecodeContext::new(*arrays, matrix_index_a);
        ctx.scale.refresh(vat, components);

        self.total_vertices += u64::from(count);

        func(src.as_ptr(), dst.as_mut_ptr(), count, &raw const ctx)
    }

    /// Vertices submitted so far, skipped ones included.
    pub fn total_vertices(&self) -> u64 {
        self.total_vertices
    }
}
