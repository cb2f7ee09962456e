mod attr;

use std::mem::offset_of;

use cranelift::codegen::ir;
use cranelift::frontend;
use cranelift::prelude::InstBuilder;
use gx::attr::AttributeMode;
use gx::{ArrayBinding, Arrays};
use rustc_hash::FxHashMap;

use crate::Codegen;
use crate::builder::attr::CoordsRead;
use crate::decl::{AttributeLayout, ComponentType, Components, VertexDeclaration};
use crate::loader::{Config, DecodeContext};
use crate::scale;

const MEMFLAGS: ir::MemFlags = ir::MemFlags::new().with_notrap().with_can_move();
const MEMFLAGS_READONLY: ir::MemFlags = ir::MemFlags::new()
    .with_notrap()
    .with_can_move()
    .with_readonly();

/// Attribute array slots, in the order they appear in [`Arrays`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ArraySlot {
    Position,
    Normal,
    Chan0,
    Chan1,
    TexCoord(usize),
}

impl ArraySlot {
    fn offset(self) -> usize {
        match self {
            Self::Position => offset_of!(Arrays, position),
            Self::Normal => offset_of!(Arrays, normal),
            Self::Chan0 => offset_of!(Arrays, chan0),
            Self::Chan1 => offset_of!(Arrays, chan1),
            Self::TexCoord(i) => offset_of!(Arrays, tex_coords) + size_of::<ArrayBinding>() * i,
        }
    }
}

/// An array binding hoisted into the loop preheader.
struct Array {
    base: ir::Value,
    stride: ir::Value,
}

struct Consts {
    ptr_type: ir::Type,

    src: ir::Value,
    dst: ir::Value,
    count: ir::Value,
    ctx: ir::Value,
}

struct Vars {
    arrays: FxHashMap<ArraySlot, Array>,
    src_row: ir::Value,
    dst_row: ir::Value,
}

/// A source operand: a base pointer plus a static displacement.
#[derive(Debug, Clone, Copy)]
struct SrcAddr {
    base: ir::Value,
    offset: i32,
}

pub struct BuildOutput {
    pub decl: VertexDeclaration,
    pub vertex_size: u32,
}

pub struct LoaderBuilder<'ctx> {
    bd: frontend::FunctionBuilder<'ctx>,
    config: Config,
    consts: Consts,
    vars: Vars,
    skip_bb: Option<ir::Block>,

    src_ofs: u32,
    dst_ofs: u32,
    texmatidx_ofs: [u32; 8],
    decl: VertexDeclaration,
}

impl<'ctx> LoaderBuilder<'ctx> {
    pub fn new(
        codegen: &'ctx Codegen,
        mut bd: frontend::FunctionBuilder<'ctx>,
        config: Config,
    ) -> Self {
        let entry_bb = bd.create_block();
        bd.append_block_params_for_function_params(entry_bb);
        bd.switch_to_block(entry_bb);
        bd.seal_block(entry_bb);

        let ptr_type = codegen.isa.pointer_type();
        let params = bd.block_params(entry_bb);
        let src = params[0];
        let dst = params[1];
        let count = params[2];
        let ctx = params[3];

        let consts = Consts {
            ptr_type,

            src,
            dst,
            count,
            ctx,
        };

        let vars = Vars {
            arrays: FxHashMap::default(),
            src_row: src,
            dst_row: dst,
        };

        Self {
            bd,
            config,
            consts,
            vars,
            skip_bb: None,

            src_ofs: 0,
            dst_ofs: 0,
            texmatidx_ofs: [0; 8],
            decl: VertexDeclaration::default(),
        }
    }

    fn ptr_extend(&mut self, value: ir::Value) -> ir::Value {
        if self.consts.ptr_type == ir::types::I32 {
            value
        } else {
            self.bd.ins().uextend(self.consts.ptr_type, value)
        }
    }

    /// Loads the broadcast scale for `slot` out of the context.
    fn scale_broadcast(&mut self, slot: usize) -> ir::Value {
        let offset = offset_of!(DecodeContext, scale) + 16 * slot;
        self.bd.ins().load(
            ir::types::F32X4,
            MEMFLAGS_READONLY,
            self.consts.ctx,
            offset as i32,
        )
    }

    fn load_array(&mut self, slot: ArraySlot, mode: AttributeMode) {
        if !mode.is_indexed() {
            return;
        }

        let ofs = offset_of!(DecodeContext, arrays) + slot.offset();
        let base = self.bd.ins().load(
            self.consts.ptr_type,
            MEMFLAGS_READONLY,
            self.consts.ctx,
            (ofs + offset_of!(ArrayBinding, base)) as i32,
        );

        let stride = self.bd.ins().load(
            ir::types::I32,
            MEMFLAGS_READONLY,
            self.consts.ctx,
            (ofs + offset_of!(ArrayBinding, stride)) as i32,
        );
        let stride = self.ptr_extend(stride);

        self.vars.arrays.insert(slot, Array { base, stride });
    }

    /// Hoists the array bindings of every indexed attribute out of the loop.
    fn head(&mut self) {
        let vcd = self.config.vcd;
        self.load_array(ArraySlot::Position, vcd.position());
        self.load_array(ArraySlot::Normal, vcd.normal());
        self.load_array(ArraySlot::Chan0, vcd.chan0());
        self.load_array(ArraySlot::Chan1, vcd.chan1());
        for i in 0..8 {
            self.load_array(ArraySlot::TexCoord(i), vcd.tex(i));
        }
    }

    /// Turns an attribute slot into an effective source address. Indexed
    /// modes consume the index from the stream here; `Direct` consumes
    /// nothing (the reader advances the offset). Indexed positions compare
    /// the index against the all-ones sentinel and branch to the skip block.
    fn vertex_addr(&mut self, slot: ArraySlot, mode: AttributeMode) -> SrcAddr {
        let index_ty = match mode {
            AttributeMode::None => unreachable!("absent attribute has no address"),
            AttributeMode::Direct => {
                return SrcAddr {
                    base: self.vars.src_row,
                    offset: self.src_ofs as i32,
                };
            }
            AttributeMode::Index8 => ir::types::I8,
            AttributeMode::Index16 => ir::types::I16,
        };

        let index = self.bd.ins().load(
            index_ty,
            MEMFLAGS_READONLY,
            self.vars.src_row,
            self.src_ofs as i32,
        );
        self.src_ofs += index_ty.bytes();

        let index = if index_ty == ir::types::I8 {
            index
        } else {
            self.bd.ins().bswap(index)
        };
        let index = self.bd.ins().uextend(ir::types::I32, index);

        if slot == ArraySlot::Position {
            let sentinel = if mode == AttributeMode::Index8 {
                0xFF
            } else {
                0xFFFF
            };

            let is_sentinel = self
                .bd
                .ins()
                .icmp_imm(ir::condcodes::IntCC::Equal, index, sentinel);

            let resume_bb = self.bd.create_block();
            self.bd
                .ins()
                .brif(is_sentinel, self.skip_bb.unwrap(), &[], resume_bb, &[]);
            self.bd.seal_block(resume_bb);
            self.bd.switch_to_block(resume_bb);
        }

        let array = &self.vars.arrays[&slot];
        let (base, stride) = (array.base, array.stride);

        let index = self.ptr_extend(index);
        let offset = self.bd.ins().imul(index, stride);
        let base = self.bd.ins().iadd(base, offset);

        SrcAddr { base, offset: 0 }
    }

    /// Emits the decode of one vertex, in GX canonical attribute order.
    fn body(&mut self) {
        let vcd = self.config.vcd;
        let vat = self.config.vat;

        // the position/normal matrix index byte is consumed last
        if vcd.pos_mat_index() {
            self.src_ofs += 1;
        }

        for i in 0..8 {
            if vcd.tex_mat(i) {
                self.texmatidx_ofs[i] = self.src_ofs;
                self.src_ofs += 1;
            }
        }

        // position first; nothing is stored before its sentinel check
        if vcd.position().is_present() {
            let desc = vat.a.position();
            let addr = self.vertex_addr(ArraySlot::Position, vcd.position());
            let (layout, _) = attr::read_coords(
                self,
                addr,
                vcd.position(),
                CoordsRead {
                    format: desc.format(),
                    count_in: desc.elements(),
                    count_out: 3,
                    dequant: vat.a.byte_dequant(),
                    scale_slot: scale::POSITION_SLOT,
                },
            );
            self.decl.position = layout;
        }

        if vcd.normal().is_present() {
            let desc = vat.a.normal();
            let elem_size = desc.format().size();

            let mut addr = self.vertex_addr(ArraySlot::Normal, vcd.normal());
            for i in 0..desc.vectors() {
                if i > 0 && vat.a.normal_index3() {
                    // normal, binormal and tangent carry their own indices
                    addr = self.vertex_addr(ArraySlot::Normal, vcd.normal());
                    addr.offset += (i * elem_size * 3) as i32;
                }

                let (layout, consumed) = attr::read_coords(
                    self,
                    addr,
                    vcd.normal(),
                    CoordsRead {
                        format: desc.format(),
                        count_in: 3,
                        count_out: 3,
                        dequant: true,
                        scale_slot: scale::normal_slot(desc.format()),
                    },
                );
                self.decl.normals[i as usize] = layout;
                addr.offset += consumed as i32;
            }

            self.decl.components.insert(Components::NORMAL0);
            if desc.vectors() == 3 {
                self.decl.components.insert(Components::NORMAL1);
                self.decl.components.insert(Components::NORMAL2);
            }
        }

        for i in 0..2 {
            let (mode, desc, slot) = if i == 0 {
                (vcd.chan0(), vat.a.chan0(), ArraySlot::Chan0)
            } else {
                (vcd.chan1(), vat.a.chan1(), ArraySlot::Chan1)
            };

            if mode.is_present() {
                let addr = self.vertex_addr(slot, mode);
                self.decl.colors[i] = attr::read_color(self, addr, mode, desc.format());
                self.decl.components.insert(Components::color(i));
            }
        }

        for i in 0..8 {
            let mode = vcd.tex(i);
            let has_matrix = vcd.tex_mat(i);
            let desc = vat.tex(i).unwrap();

            if mode.is_present() {
                let elements = desc.elements();
                let addr = self.vertex_addr(ArraySlot::TexCoord(i), mode);
                let (layout, _) = attr::read_coords(
                    self,
                    addr,
                    mode,
                    CoordsRead {
                        format: desc.format(),
                        count_in: elements,
                        count_out: if has_matrix { 2 } else { elements },
                        dequant: vat.a.byte_dequant(),
                        scale_slot: scale::TEX0_SLOT + i,
                    },
                );
                self.decl.tex_coords[i] = layout;
                self.decl.components.insert(Components::uv(i));
            }

            if has_matrix {
                self.decl.components.insert(Components::tex_matrix(i));
                self.decl.components.insert(Components::uv(i));

                // the matrix index byte captured earlier becomes a float lane
                let index = self.bd.ins().load(
                    ir::types::I8,
                    MEMFLAGS_READONLY,
                    self.vars.src_row,
                    self.texmatidx_ofs[i] as i32,
                );
                let index = self.bd.ins().uextend(ir::types::I32, index);
                let index = self.bd.ins().fcvt_from_uint(ir::types::F32, index);

                if mode.is_present() {
                    self.bd
                        .ins()
                        .store(MEMFLAGS, index, self.vars.dst_row, self.dst_ofs as i32);
                    self.dst_ofs += 4;
                    self.decl.tex_coords[i].components = 3;
                } else {
                    self.decl.tex_coords[i] = AttributeLayout {
                        enable: true,
                        offset: self.dst_ofs,
                        components: 3,
                        ty: ComponentType::Float32,
                    };

                    let zero = self.bd.ins().f32const(0.0);
                    self.bd
                        .ins()
                        .store(MEMFLAGS, zero, self.vars.dst_row, self.dst_ofs as i32);
                    self.bd.ins().store(
                        MEMFLAGS,
                        zero,
                        self.vars.dst_row,
                        self.dst_ofs as i32 + 4,
                    );
                    self.bd.ins().store(
                        MEMFLAGS,
                        index,
                        self.vars.dst_row,
                        self.dst_ofs as i32 + 8,
                    );
                    self.dst_ofs += 12;
                }
            }
        }

        // the resolved position matrix word always closes the vertex; when the
        // stream has no index the live register value is used instead
        let index = if vcd.pos_mat_index() {
            let byte = self
                .bd
                .ins()
                .load(ir::types::I8, MEMFLAGS_READONLY, self.vars.src_row, 0);
            self.decl.components.insert(Components::POS_MATRIX);
            self.bd.ins().uextend(ir::types::I32, byte)
        } else {
            self.bd.ins().load(
                ir::types::I32,
                MEMFLAGS_READONLY,
                self.consts.ctx,
                offset_of!(DecodeContext, matrix_index_a) as i32,
            )
        };

        let index = self.bd.ins().band_imm(index, 0x3F);
        self.bd
            .ins()
            .store(MEMFLAGS, index, self.vars.dst_row, self.dst_ofs as i32);
        self.decl.pos_matrix = AttributeLayout {
            enable: true,
            offset: self.dst_ofs,
            components: 4,
            ty: ComponentType::UByte,
        };
        self.dst_ofs += 4;
    }

    pub fn build(mut self) -> BuildOutput {
        self.head();

        let loop_bb = self.bd.create_block();
        self.bd.append_block_param(loop_bb, self.consts.ptr_type); // src row
        self.bd.append_block_param(loop_bb, self.consts.ptr_type); // dst row
        self.bd.append_block_param(loop_bb, ir::types::I32); // skipped
        self.bd.append_block_param(loop_bb, ir::types::I32); // iteration

        let body_bb = self.bd.create_block();

        let exit_bb = self.bd.create_block();
        self.bd.set_cold_block(exit_bb);
        self.bd.append_block_param(exit_bb, ir::types::I32); // skipped

        if self.config.vcd.position().is_indexed() {
            let skip_bb = self.bd.create_block();
            self.bd.set_cold_block(skip_bb);
            self.skip_bb = Some(skip_bb);
        }

        let zero = self.bd.ins().iconst(ir::types::I32, 0);
        self.bd.ins().jump(
            loop_bb,
            &[
                ir::BlockArg::Value(self.consts.src),
                ir::BlockArg::Value(self.consts.dst),
                ir::BlockArg::Value(zero),
                ir::BlockArg::Value(zero),
            ],
        );

        self.bd.switch_to_block(loop_bb);
        let params = self.bd.block_params(loop_bb);
        let src_row = params[0];
        let dst_row = params[1];
        let skipped = params[2];
        let iteration = params[3];
        self.vars.src_row = src_row;
        self.vars.dst_row = dst_row;

        let more = self.bd.ins().icmp(
            ir::condcodes::IntCC::UnsignedLessThan,
            iteration,
            self.consts.count,
        );
        self.bd
            .ins()
            .brif(more, body_bb, &[], exit_bb, &[ir::BlockArg::Value(skipped)]);

        self.bd.seal_block(body_bb);
        self.bd.seal_block(exit_bb);

        self.bd.switch_to_block(body_bb);
        self.body();

        // both offsets are final now: advance the rows and go again
        let next_src = self.bd.ins().iadd_imm(src_row, self.src_ofs as i64);
        let next_dst = self.bd.ins().iadd_imm(dst_row, self.dst_ofs as i64);
        let next_iter = self.bd.ins().iadd_imm(iteration, 1);
        self.bd.ins().jump(
            loop_bb,
            &[
                ir::BlockArg::Value(next_src),
                ir::BlockArg::Value(next_dst),
                ir::BlockArg::Value(skipped),
                ir::BlockArg::Value(next_iter),
            ],
        );

        // a skipped vertex advances the source but not the destination
        if let Some(skip_bb) = self.skip_bb {
            self.bd.switch_to_block(skip_bb);
            let next_src = self.bd.ins().iadd_imm(src_row, self.src_ofs as i64);
            let next_skipped = self.bd.ins().iadd_imm(skipped, 1);
            let next_iter = self.bd.ins().iadd_imm(iteration, 1);
            self.bd.ins().jump(
                loop_bb,
                &[
                    ir::BlockArg::Value(next_src),
                    ir::BlockArg::Value(dst_row),
                    ir::BlockArg::Value(next_skipped),
                    ir::BlockArg::Value(next_iter),
                ],
            );
            self.bd.seal_block(skip_bb);
        }

        self.bd.seal_block(loop_bb);

        self.bd.switch_to_block(exit_bb);
        let skipped = self.bd.block_params(exit_bb)[0];
        let emitted = self.bd.ins().isub(self.consts.count, skipped);
        self.bd.ins().return_(&[emitted]);
        self.bd.finalize();

        self.decl.stride = self.dst_ofs;

        BuildOutput {
            decl: self.decl,
            vertex_size: self.src_ofs,
        }
    }
}
