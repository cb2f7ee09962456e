use cranelift::codegen::ir;
use cranelift::prelude::InstBuilder;
use gx::attr::{AttributeMode, ColorFormat, CoordFormat};
use zerocopy::IntoBytes;

use crate::builder::{LoaderBuilder, MEMFLAGS, MEMFLAGS_READONLY, SrcAddr};
use crate::decl::{AttributeLayout, ComponentType};

/// How a numeric attribute is pulled out of the stream.
pub struct CoordsRead {
    pub format: CoordFormat,
    /// Components in the stream (1..=3).
    pub count_in: u32,
    /// Components in the native vertex; lanes past `count_in` come out zero.
    pub count_out: u32,
    pub dequant: bool,
    pub scale_slot: usize,
}

const ZEROED: u8 = 0xFF;

/// Builds the gather-and-swap mask for `count` components of `format`.
///
/// Signed lanes land in the high bytes of their 32-bit lane, so a single
/// arithmetic shift right performs the byteswap correction and the sign
/// extension at once. Unsigned lanes land byteswapped in the low bytes and
/// are already zero-extended. Missing lanes collapse to zero.
fn shuffle_mask(format: CoordFormat, count: u32) -> [u8; 16] {
    let mut mask = [ZEROED; 16];
    for lane in 0..count as usize {
        let bytes = &mut mask[4 * lane..4 * lane + 4];
        let lane = lane as u8;
        match format {
            CoordFormat::U8 => bytes[0] = lane,
            CoordFormat::I8 => bytes[3] = lane,
            CoordFormat::U16 => {
                bytes[0] = 2 * lane + 1;
                bytes[1] = 2 * lane;
            }
            CoordFormat::I16 => {
                bytes[2] = 2 * lane + 1;
                bytes[3] = 2 * lane;
            }
            CoordFormat::F32 => {
                bytes[0] = 4 * lane + 3;
                bytes[1] = 4 * lane + 2;
                bytes[2] = 4 * lane + 1;
                bytes[3] = 4 * lane;
            }
            _ => panic!("reserved format"),
        }
    }

    mask
}

/// Flags for bitcasts between vector types, which must fix a lane order.
fn lane_flags() -> ir::MemFlags {
    ir::MemFlags::new().with_endianness(ir::Endianness::Little)
}

/// Sign-extends an immediate so it fits Cranelift's Imm64 encoding for I32.
const fn imm(value: u32) -> i64 {
    value as i32 as i64
}

/// Emits the decode of a numeric attribute at `addr` into the next
/// destination slot. Returns the filled layout and the source bytes the
/// attribute occupies (consumed from the stream only when `mode` is direct).
pub fn read_coords(
    parser: &mut LoaderBuilder,
    addr: SrcAddr,
    mode: AttributeMode,
    read: CoordsRead,
) -> (AttributeLayout, u32) {
    let elem_size = read.format.size();
    let load_bytes = elem_size * read.count_in;

    // narrowest of a 4, 8 or 16 byte load
    let bytes = if load_bytes > 8 {
        parser
            .bd
            .ins()
            .load(ir::types::I8X16, MEMFLAGS_READONLY, addr.base, addr.offset)
    } else if load_bytes > 4 {
        let wide = parser
            .bd
            .ins()
            .load(ir::types::I64, MEMFLAGS_READONLY, addr.base, addr.offset);
        let vec = parser.bd.ins().scalar_to_vector(ir::types::I64X2, wide);
        parser.bd.ins().bitcast(ir::types::I8X16, lane_flags(), vec)
    } else {
        let narrow = parser
            .bd
            .ins()
            .load(ir::types::I32, MEMFLAGS_READONLY, addr.base, addr.offset);
        let vec = parser.bd.ins().scalar_to_vector(ir::types::I32X4, narrow);
        parser.bd.ins().bitcast(ir::types::I8X16, lane_flags(), vec)
    };

    // gather lanes and swap to little endian in one shuffle
    let mask = shuffle_mask(read.format, read.count_in);
    let mask = parser
        .bd
        .func
        .dfg
        .constants
        .insert(ir::ConstantData::from(mask.as_bytes()));
    let mask = parser.bd.ins().vconst(ir::types::I8X16, mask);
    let shuffled = parser.bd.ins().swizzle(bytes, mask);
    let lanes = parser
        .bd
        .ins()
        .bitcast(ir::types::I32X4, lane_flags(), shuffled);

    let coords = if read.format == CoordFormat::F32 {
        parser.bd.ins().bitcast(ir::types::F32X4, lane_flags(), lanes)
    } else {
        let lanes = if read.format.is_signed() {
            let shift = 32 - 8 * elem_size as i64;
            parser.bd.ins().sshr_imm(lanes, shift)
        } else {
            lanes
        };

        let coords = if read.format.is_signed() {
            parser.bd.ins().fcvt_from_sint(ir::types::F32X4, lanes)
        } else {
            parser.bd.ins().fcvt_from_uint(ir::types::F32X4, lanes)
        };

        if read.dequant {
            let scale = parser.scale_broadcast(read.scale_slot);
            parser.bd.ins().fmul(coords, scale)
        } else {
            coords
        }
    };

    // store only the meaningful lanes
    for lane in 0..read.count_out {
        let value = parser.bd.ins().extractlane(coords, lane as u8);
        parser.bd.ins().store(
            MEMFLAGS,
            value,
            parser.vars.dst_row,
            (parser.dst_ofs + 4 * lane) as i32,
        );
    }

    let layout = AttributeLayout {
        enable: true,
        offset: parser.dst_ofs,
        components: read.count_out,
        ty: ComponentType::Float32,
    };

    parser.dst_ofs += 4 * read.count_out;
    if mode == AttributeMode::Direct {
        parser.src_ofs += load_bytes;
    }

    (layout, load_bytes)
}

/// Loads a 16 bit big-endian value as a zero-extended I32.
fn load_be16(parser: &mut LoaderBuilder, addr: SrcAddr, offset: i32) -> ir::Value {
    let value = parser.bd.ins().load(
        ir::types::I16,
        MEMFLAGS_READONLY,
        addr.base,
        addr.offset + offset,
    );
    let value = parser.bd.ins().bswap(value);
    parser.bd.ins().uextend(ir::types::I32, value)
}

/// Stores a packed color word reversed, so the destination bytes read
/// R,G,B,A at ascending addresses.
fn swap_store(parser: &mut LoaderBuilder, value: ir::Value) {
    let swapped = parser.bd.ins().bswap(value);
    parser.bd.ins().store(
        MEMFLAGS,
        swapped,
        parser.vars.dst_row,
        parser.dst_ofs as i32,
    );
}

/// Emits the decode of a color attribute at `addr` into a canonical
/// 4-byte R,G,B,A destination slot. The 565/4444/6666 expansions replicate
/// the high bits of each channel into the freed low bits, so a maximal field
/// widens to 0xFF.
pub fn read_color(
    parser: &mut LoaderBuilder,
    addr: SrcAddr,
    mode: AttributeMode,
    format: ColorFormat,
) -> AttributeLayout {
    let load_bytes = match format {
        ColorFormat::Rgb888 | ColorFormat::Rgb888x | ColorFormat::Rgba8888 => {
            // the memory order already matches the destination; alpha is
            // forced for the alpha-less formats
            let value = if format == ColorFormat::Rgba8888 {
                parser
                    .bd
                    .ins()
                    .load(ir::types::I32, MEMFLAGS_READONLY, addr.base, addr.offset)
            } else {
                let rg = parser
                    .bd
                    .ins()
                    .load(ir::types::I16, MEMFLAGS_READONLY, addr.base, addr.offset);
                let rg = parser.bd.ins().uextend(ir::types::I32, rg);
                let b = parser.bd.ins().load(
                    ir::types::I8,
                    MEMFLAGS_READONLY,
                    addr.base,
                    addr.offset + 2,
                );
                let b = parser.bd.ins().uextend(ir::types::I32, b);
                let b = parser.bd.ins().ishl_imm(b, 16);
                let rgb = parser.bd.ins().bor(rg, b);
                parser.bd.ins().bor_imm(rgb, imm(0xFF00_0000))
            };

            parser.bd.ins().store(
                MEMFLAGS,
                value,
                parser.vars.dst_row,
                parser.dst_ofs as i32,
            );

            3 + u32::from(format != ColorFormat::Rgb888)
        }

        ColorFormat::Rgb565 => {
            //                   RRRRRGGG GGGBBBBB
            // AAAAAAAA BBBBBBBB GGGGGGGG RRRRRRRR
            let value = load_be16(parser, addr, 0);

            let r = parser.bd.ins().ishl_imm(value, 16);
            let r = parser.bd.ins().band_imm(r, imm(0xF800_0000));
            let g = parser.bd.ins().ishl_imm(value, 13);
            let g = parser.bd.ins().band_imm(g, imm(0x00FC_0000));
            let b = parser.bd.ins().ishl_imm(value, 11);
            let b = parser.bd.ins().band_imm(b, imm(0x0000_F800));

            let base = parser.bd.ins().bor(r, g);
            let base = parser.bd.ins().bor(base, b);

            let rep1 = parser.bd.ins().ushr_imm(base, 5);
            let rep1 = parser.bd.ins().band_imm(rep1, imm(0x0700_0700));
            let rep2 = parser.bd.ins().ushr_imm(base, 6);
            let rep2 = parser.bd.ins().band_imm(rep2, imm(0x0003_0000));

            let value = parser.bd.ins().bor(base, rep1);
            let value = parser.bd.ins().bor(value, rep2);
            let value = parser.bd.ins().bor_imm(value, imm(0x0000_00FF));

            swap_store(parser, value);
            2
        }

        ColorFormat::Rgba4444 => {
            //                   RRRRGGGG BBBBAAAA
            // AAAAAAAA BBBBBBBB GGGGGGGG RRRRRRRR
            let value = load_be16(parser, addr, 0);

            let r = parser.bd.ins().ishl_imm(value, 12);
            let r = parser.bd.ins().band_imm(r, imm(0x0F00_0000));
            let g = parser.bd.ins().ishl_imm(value, 8);
            let g = parser.bd.ins().band_imm(g, imm(0x000F_0000));
            let b = parser.bd.ins().ishl_imm(value, 4);
            let b = parser.bd.ins().band_imm(b, imm(0x0000_0F00));
            let a = parser.bd.ins().band_imm(value, imm(0x0000_000F));

            let low = parser.bd.ins().bor(r, g);
            let low = parser.bd.ins().bor(low, b);
            let low = parser.bd.ins().bor(low, a);

            // replicate each nibble into the high half of its byte
            let high = parser.bd.ins().ishl_imm(low, 4);
            let value = parser.bd.ins().bor(low, high);

            swap_store(parser, value);
            2
        }

        ColorFormat::Rgba6666 => {
            //          RRRRRRGG GGGGBBBB BBAAAAAA
            // AAAAAAAA BBBBBBBB GGGGGGGG RRRRRRRR
            let high = load_be16(parser, addr, 0);
            let high = parser.bd.ins().ishl_imm(high, 8);
            let low = parser.bd.ins().load(
                ir::types::I8,
                MEMFLAGS_READONLY,
                addr.base,
                addr.offset + 2,
            );
            let low = parser.bd.ins().uextend(ir::types::I32, low);
            let value = parser.bd.ins().bor(high, low);

            let r = parser.bd.ins().ishl_imm(value, 8);
            let r = parser.bd.ins().band_imm(r, imm(0xFC00_0000));
            let g = parser.bd.ins().ishl_imm(value, 6);
            let g = parser.bd.ins().band_imm(g, imm(0x00FC_0000));
            let b = parser.bd.ins().ishl_imm(value, 4);
            let b = parser.bd.ins().band_imm(b, imm(0x0000_FC00));
            let a = parser.bd.ins().ishl_imm(value, 2);
            let a = parser.bd.ins().band_imm(a, imm(0x0000_00FC));

            let base = parser.bd.ins().bor(r, g);
            let base = parser.bd.ins().bor(base, b);
            let base = parser.bd.ins().bor(base, a);

            let rep = parser.bd.ins().ushr_imm(base, 6);
            let rep = parser.bd.ins().band_imm(rep, imm(0x0303_0303));
            let value = parser.bd.ins().bor(base, rep);

            swap_store(parser, value);
            3
        }

        _ => panic!("reserved color format"),
    };

    let layout = AttributeLayout {
        enable: true,
        offset: parser.dst_ofs,
        components: 4,
        ty: ComponentType::UByte,
    };

    parser.dst_ofs += 4;
    if mode == AttributeMode::Direct {
        parser.src_ofs += load_bytes;
    }

    layout
}
