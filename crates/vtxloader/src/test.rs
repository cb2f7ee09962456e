use bitos::integer::u5;
use cranelift::codegen;
use cranelift::frontend::FunctionBuilderContext;
use gx::attr::{
    AttributeMode, ColorDescriptor, ColorFormat, ColorKind, CoordFormat, NormalCount,
    NormalDescriptor, PositionDescriptor, PositionKind, TexCoordDescriptor, TexCoordKind,
    VertexAttributeTable,
};
use gx::{ArrayBinding, Arrays, VertexDescriptor};

use crate::decl::{ComponentType, Components};
use crate::loader::Config;
use crate::{Codegen, JitVertexLoader, isa};

fn jit() -> Option<JitVertexLoader> {
    JitVertexLoader::is_supported().then(JitVertexLoader::new)
}

/// Runs `count` vertices through the loader for `(vcd, vat)`, with the source
/// padded by the documented read slack.
fn run(
    jit: &mut JitVertexLoader,
    vcd: &VertexDescriptor,
    vat: &VertexAttributeTable,
    arrays: &Arrays,
    matrix_index_a: u32,
    src: &[u8],
    count: u32,
) -> (Vec<u8>, u32) {
    let stride = jit.loader(vcd, vat).native_stride() as usize;

    let mut padded = src.to_vec();
    padded.extend_from_slice(&[0; 16]);

    let mut dst = vec![0u8; stride * count as usize];
    let emitted =
        unsafe { jit.run_vertices(vcd, vat, arrays, matrix_index_a, &padded, &mut dst, count) };

    (dst, emitted)
}

fn f32_at(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn push_be_f32(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_bits().to_be_bytes());
}

fn f32_vec3_position() -> PositionDescriptor {
    PositionDescriptor::default()
        .with_kind(PositionKind::Vec3)
        .with_format(CoordFormat::F32)
}

#[test]
fn direct_f32_position_with_rgb888_color() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default()
        .with_position(AttributeMode::Direct)
        .with_chan0(AttributeMode::Direct);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat
        .a
        .with_position(f32_vec3_position())
        .with_chan0(
            ColorDescriptor::default()
                .with_kind(ColorKind::Rgb)
                .with_format(ColorFormat::Rgb888),
        );

    {
        let loader = jit.loader(&vcd, &vat);
        assert_eq!(loader.vertex_size(), 15);
        assert_eq!(loader.native_stride(), 20);

        let decl = loader.declaration();
        assert_eq!(decl.position.offset, 0);
        assert_eq!(decl.position.components, 3);
        assert_eq!(decl.position.ty, ComponentType::Float32);
        assert_eq!(decl.colors[0].offset, 12);
        assert_eq!(decl.colors[0].components, 4);
        assert_eq!(decl.colors[0].ty, ComponentType::UByte);
        assert_eq!(decl.pos_matrix.offset, 16);
        assert_eq!(decl.stride, 20);
    }

    let mut src = Vec::new();
    for (pos, rgb) in [
        ([1.0f32, 2.0, 3.0], [0xAA, 0xBB, 0xCC]),
        ([-1.0, 0.0, 1.0], [0x11, 0x22, 0x33]),
    ] {
        for c in pos {
            push_be_f32(&mut src, c);
        }
        src.extend_from_slice(&rgb);
    }

    let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &src, 2);
    assert_eq!(emitted, 2);

    assert_eq!(f32_at(&dst, 0), 1.0);
    assert_eq!(f32_at(&dst, 4), 2.0);
    assert_eq!(f32_at(&dst, 8), 3.0);
    assert_eq!(&dst[12..16], &[0xAA, 0xBB, 0xCC, 0xFF]);
    assert_eq!(u32_at(&dst, 16), 0);

    assert_eq!(f32_at(&dst, 20), -1.0);
    assert_eq!(f32_at(&dst, 24), 0.0);
    assert_eq!(f32_at(&dst, 28), 1.0);
    assert_eq!(&dst[32..36], &[0x11, 0x22, 0x33, 0xFF]);
}

#[test]
fn index8_position_sentinel_skips() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default()
        .with_position(AttributeMode::Index8)
        .with_chan0(AttributeMode::Direct);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat
        .a
        .with_position(f32_vec3_position())
        .with_chan0(
            ColorDescriptor::default()
                .with_kind(ColorKind::Rgb)
                .with_format(ColorFormat::Rgb888),
        );

    let mut positions = Vec::new();
    for c in [1.0f32, 2.0, 3.0] {
        push_be_f32(&mut positions, c);
    }
    positions.extend_from_slice(&[0; 16]);

    let arrays = Arrays {
        position: ArrayBinding {
            base: positions.as_ptr(),
            stride: 12,
        },
        ..Default::default()
    };

    assert_eq!(jit.loader(&vcd, &vat).vertex_size(), 4);

    // vertex #1 carries the sentinel: no record, but the source advances
    let src = [0x00, 0xAA, 0xBB, 0xCC, 0xFF, 0x11, 0x22, 0x33];
    let (dst, emitted) = run(&mut jit, &vcd, &vat, &arrays, 0x25, &src, 2);
    assert_eq!(emitted, 1);

    assert_eq!(f32_at(&dst, 0), 1.0);
    assert_eq!(f32_at(&dst, 4), 2.0);
    assert_eq!(f32_at(&dst, 8), 3.0);
    assert_eq!(&dst[12..16], &[0xAA, 0xBB, 0xCC, 0xFF]);
    assert_eq!(u32_at(&dst, 16), 0x25);

    // the second record was never touched
    assert!(dst[20..40].iter().all(|&b| b == 0));
}

#[test]
fn index16_position_selects_and_skips() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_position(AttributeMode::Index16);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat.a.with_position(f32_vec3_position());

    let mut positions = Vec::new();
    for c in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0] {
        push_be_f32(&mut positions, c);
    }
    positions.extend_from_slice(&[0; 16]);

    let arrays = Arrays {
        position: ArrayBinding {
            base: positions.as_ptr(),
            stride: 12,
        },
        ..Default::default()
    };

    assert_eq!(jit.loader(&vcd, &vat).vertex_size(), 2);

    // entry 1, sentinel, entry 0: indices are big-endian in the stream
    let src = [0x00, 0x01, 0xFF, 0xFF, 0x00, 0x00];
    let (dst, emitted) = run(&mut jit, &vcd, &vat, &arrays, 0, &src, 3);
    assert_eq!(emitted, 2);

    assert_eq!(f32_at(&dst, 0), 4.0);
    assert_eq!(f32_at(&dst, 4), 5.0);
    assert_eq!(f32_at(&dst, 8), 6.0);
    assert_eq!(f32_at(&dst, 16), 1.0);
    assert_eq!(f32_at(&dst, 20), 2.0);
    assert_eq!(f32_at(&dst, 24), 3.0);
    assert!(dst[32..48].iter().all(|&b| b == 0));

    assert_eq!(jit.total_vertices(), 3);
}

#[test]
fn byte_dequant_u8_position_zero_fills() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_position(AttributeMode::Direct);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat
        .a
        .with_position(
            PositionDescriptor::default()
                .with_kind(PositionKind::Vec2)
                .with_format(CoordFormat::U8),
        )
        .with_byte_dequant(true);

    assert_eq!(jit.loader(&vcd, &vat).vertex_size(), 2);
    assert_eq!(jit.loader(&vcd, &vat).native_stride(), 16);

    let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &[0x80, 0x40], 1);
    assert_eq!(emitted, 1);
    assert_eq!(f32_at(&dst, 0), 128.0);
    assert_eq!(f32_at(&dst, 4), 64.0);
    assert_eq!(f32_at(&dst, 8), 0.0);
}

#[test]
fn quantized_i16_position() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_position(AttributeMode::Direct);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat
        .a
        .with_position(
            PositionDescriptor::default()
                .with_kind(PositionKind::Vec3)
                .with_format(CoordFormat::I16)
                .with_shift(u5::new(4)),
        )
        .with_byte_dequant(true);

    // 4660, -16, 32, all over 2^4
    let src = [0x12, 0x34, 0xFF, 0xF0, 0x00, 0x20];
    let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &src, 1);
    assert_eq!(emitted, 1);
    assert_eq!(f32_at(&dst, 0), 291.25);
    assert_eq!(f32_at(&dst, 4), -1.0);
    assert_eq!(f32_at(&dst, 8), 2.0);
}

#[test]
fn u16_position_is_zero_extended() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_position(AttributeMode::Direct);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat
        .a
        .with_position(
            PositionDescriptor::default()
                .with_kind(PositionKind::Vec2)
                .with_format(CoordFormat::U16),
        )
        .with_byte_dequant(true);

    let src = [0xFF, 0xFF, 0x00, 0x01];
    let (dst, _) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &src, 1);
    assert_eq!(f32_at(&dst, 0), 65535.0);
    assert_eq!(f32_at(&dst, 4), 1.0);
    assert_eq!(f32_at(&dst, 8), 0.0);
}

#[test]
fn tex_matrix_index_joins_coords() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default()
        .with_tex_mat(0, true)
        .with_tex(0, AttributeMode::Direct);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat.a.with_tex0(
        TexCoordDescriptor::default()
            .with_kind(TexCoordKind::St)
            .with_format(CoordFormat::F32),
    );

    {
        let loader = jit.loader(&vcd, &vat);
        assert_eq!(loader.vertex_size(), 9);
        assert_eq!(loader.native_stride(), 16);

        let decl = loader.declaration();
        assert_eq!(decl.tex_coords[0].offset, 0);
        assert_eq!(decl.tex_coords[0].components, 3);
        assert_eq!(decl.tex_coords[0].ty, ComponentType::Float32);
        assert!(decl.components.contains(Components::tex_matrix(0)));
        assert!(decl.components.contains(Components::uv(0)));
    }

    let mut src = vec![0x07];
    push_be_f32(&mut src, 0.5);
    push_be_f32(&mut src, 0.25);

    let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &src, 1);
    assert_eq!(emitted, 1);
    assert_eq!(f32_at(&dst, 0), 0.5);
    assert_eq!(f32_at(&dst, 4), 0.25);
    assert_eq!(f32_at(&dst, 8), 7.0);
}

#[test]
fn tex_matrix_index_without_coords_synthesizes_triple() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_tex_mat(2, true);
    let vat = VertexAttributeTable::default();

    {
        let loader = jit.loader(&vcd, &vat);
        assert_eq!(loader.vertex_size(), 1);
        assert_eq!(loader.native_stride(), 16);

        let decl = loader.declaration();
        assert_eq!(decl.tex_coords[2].offset, 0);
        assert_eq!(decl.tex_coords[2].components, 3);
        assert!(decl.components.contains(Components::tex_matrix(2)));
        assert!(decl.components.contains(Components::uv(2)));
    }

    let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &[0x05], 1);
    assert_eq!(emitted, 1);

    // the matrix index rides the third lane
    assert_eq!(f32_at(&dst, 0), 0.0);
    assert_eq!(f32_at(&dst, 4), 0.0);
    assert_eq!(f32_at(&dst, 8), 5.0);
}

#[test]
fn single_component_texcoord() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_tex(0, AttributeMode::Direct);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat
        .a
        .with_tex0(
            TexCoordDescriptor::default()
                .with_kind(TexCoordKind::S)
                .with_format(CoordFormat::U8),
        )
        .with_byte_dequant(true);

    {
        let loader = jit.loader(&vcd, &vat);
        assert_eq!(loader.vertex_size(), 1);
        assert_eq!(loader.native_stride(), 8);
        assert_eq!(loader.declaration().tex_coords[0].components, 1);
    }

    let (dst, _) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &[0x80], 1);
    assert_eq!(f32_at(&dst, 0), 128.0);
}

#[test]
fn pos_matrix_index_only() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_pos_mat_index(true);
    let vat = VertexAttributeTable::default();

    {
        let loader = jit.loader(&vcd, &vat);
        assert_eq!(loader.vertex_size(), 1);
        assert_eq!(loader.native_stride(), 4);

        let decl = loader.declaration();
        assert!(decl.pos_matrix.enable);
        assert_eq!(decl.pos_matrix.offset, 0);
        assert_eq!(decl.pos_matrix.components, 4);
        assert_eq!(decl.pos_matrix.ty, ComponentType::UByte);
        assert!(decl.components.contains(Components::POS_MATRIX));
    }

    // only the low six bits of the index survive
    let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &[0x47], 1);
    assert_eq!(emitted, 1);
    assert_eq!(u32_at(&dst, 0), 0x07);
}

#[test]
fn color_expansion_is_bit_exact() {
    let Some(mut jit) = jit() else { return };

    let cases: &[(ColorFormat, &[u8], [u8; 4])] = &[
        (ColorFormat::Rgb565, &[0xF8, 0x00], [0xFF, 0x00, 0x00, 0xFF]),
        (ColorFormat::Rgb565, &[0x07, 0xE0], [0x00, 0xFF, 0x00, 0xFF]),
        (ColorFormat::Rgb565, &[0x00, 0x1F], [0x00, 0x00, 0xFF, 0xFF]),
        (ColorFormat::Rgb565, &[0xFF, 0xFF], [0xFF, 0xFF, 0xFF, 0xFF]),
        (ColorFormat::Rgba4444, &[0xF0, 0xA5], [0xFF, 0x00, 0xAA, 0x55]),
        (ColorFormat::Rgba4444, &[0xFF, 0xFF], [0xFF, 0xFF, 0xFF, 0xFF]),
        (ColorFormat::Rgba6666, &[0xFF, 0x00, 0xFF], [0xFF, 0xC3, 0x0C, 0xFF]),
        (ColorFormat::Rgba6666, &[0xFF, 0xFF, 0xFF], [0xFF, 0xFF, 0xFF, 0xFF]),
        (ColorFormat::Rgb888, &[0x12, 0x34, 0x56], [0x12, 0x34, 0x56, 0xFF]),
        (
            ColorFormat::Rgb888x,
            &[0x12, 0x34, 0x56, 0x99],
            [0x12, 0x34, 0x56, 0xFF],
        ),
        (
            ColorFormat::Rgba8888,
            &[0x12, 0x34, 0x56, 0x78],
            [0x12, 0x34, 0x56, 0x78],
        ),
    ];

    for (format, src, expected) in cases {
        let vcd = VertexDescriptor::default().with_chan0(AttributeMode::Direct);

        let mut vat = VertexAttributeTable::default();
        vat.a = vat.a.with_chan0(
            ColorDescriptor::default()
                .with_kind(ColorKind::Rgba)
                .with_format(*format),
        );

        let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, src, 1);
        assert_eq!(emitted, 1);
        assert_eq!(&dst[0..4], expected, "{format:?} {src:02X?}");
    }
}

#[test]
fn normal_index3_reads_three_indices() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_normal(AttributeMode::Index8);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat
        .a
        .with_normal(
            NormalDescriptor::default()
                .with_count(NormalCount::Nbt)
                .with_format(CoordFormat::I8),
        )
        .with_normal_index3(true);

    // one array entry with normal, binormal and tangent back to back
    let mut entry: Vec<u8> = [64i8, 64, 64, 32, 32, 32, 16, 16, 16]
        .iter()
        .map(|&v| v as u8)
        .collect();
    entry.extend_from_slice(&[0; 16]);

    let arrays = Arrays {
        normal: ArrayBinding {
            base: entry.as_ptr(),
            stride: 9,
        },
        ..Default::default()
    };

    {
        let loader = jit.loader(&vcd, &vat);
        assert_eq!(loader.vertex_size(), 3);
        assert_eq!(loader.native_stride(), 40);

        let decl = loader.declaration();
        assert!(decl.components.contains(Components::NORMAL0));
        assert!(decl.components.contains(Components::NORMAL1));
        assert!(decl.components.contains(Components::NORMAL2));
    }

    let (dst, emitted) = run(&mut jit, &vcd, &vat, &arrays, 0, &[0, 0, 0], 1);
    assert_eq!(emitted, 1);

    // signed bytes dequantize by 2^-6
    for lane in 0..3 {
        assert_eq!(f32_at(&dst, lane * 4), 1.0);
        assert_eq!(f32_at(&dst, 12 + lane * 4), 0.5);
        assert_eq!(f32_at(&dst, 24 + lane * 4), 0.25);
    }
}

fn fat_config() -> (VertexDescriptor, VertexAttributeTable) {
    let vcd = VertexDescriptor::default()
        .with_pos_mat_index(true)
        .with_tex_mat(0, true)
        .with_position(AttributeMode::Direct)
        .with_normal(AttributeMode::Direct)
        .with_chan0(AttributeMode::Direct)
        .with_chan1(AttributeMode::Direct)
        .with_tex(0, AttributeMode::Direct)
        .with_tex(1, AttributeMode::Direct);

    let mut vat = VertexAttributeTable::default();
    vat.a = vat
        .a
        .with_position(
            PositionDescriptor::default()
                .with_kind(PositionKind::Vec3)
                .with_format(CoordFormat::I16)
                .with_shift(u5::new(4)),
        )
        .with_normal(
            NormalDescriptor::default()
                .with_count(NormalCount::Nbt)
                .with_format(CoordFormat::I16),
        )
        .with_chan0(
            ColorDescriptor::default()
                .with_kind(ColorKind::Rgba)
                .with_format(ColorFormat::Rgb565),
        )
        .with_chan1(
            ColorDescriptor::default()
                .with_kind(ColorKind::Rgba)
                .with_format(ColorFormat::Rgba8888),
        )
        .with_tex0(
            TexCoordDescriptor::default()
                .with_kind(TexCoordKind::St)
                .with_format(CoordFormat::I16)
                .with_shift(u5::new(2)),
        )
        .with_byte_dequant(true);
    vat = vat.with_tex(
        1,
        TexCoordDescriptor::default()
            .with_kind(TexCoordKind::S)
            .with_format(CoordFormat::U8),
    );

    (vcd, vat)
}

#[test]
fn fat_descriptor_layout_invariants() {
    let Some(mut jit) = jit() else { return };

    let (vcd, vat) = fat_config();
    let loader = jit.loader(&vcd, &vat);

    // 1 posmtx + 1 texmtx0 + 6 pos + 18 normals + 2 + 4 colors + 4 tex0 + 1 tex1
    assert_eq!(loader.vertex_size(), 37);
    assert_eq!(loader.native_stride(), 76);

    let decl = loader.declaration().clone();
    let offsets = [
        decl.position.offset,
        decl.normals[0].offset,
        decl.normals[1].offset,
        decl.normals[2].offset,
        decl.colors[0].offset,
        decl.colors[1].offset,
        decl.tex_coords[0].offset,
        decl.tex_coords[1].offset,
        decl.pos_matrix.offset,
    ];

    // destination offsets follow canonical attribute order
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));

    for layout in [
        decl.position,
        decl.normals[0],
        decl.normals[1],
        decl.normals[2],
        decl.colors[0],
        decl.colors[1],
        decl.tex_coords[0],
        decl.tex_coords[1],
        decl.pos_matrix,
    ] {
        assert!(layout.enable);
        assert!(layout.offset < decl.stride);
        assert!(layout.offset + layout.components * layout.ty.size() <= decl.stride);
    }

    assert_eq!(decl.tex_coords[0].components, 3);
    assert_eq!(decl.tex_coords[1].components, 1);

    for flag in [
        Components::POS_MATRIX,
        Components::tex_matrix(0),
        Components::NORMAL0,
        Components::NORMAL1,
        Components::NORMAL2,
        Components::color(0),
        Components::color(1),
        Components::uv(0),
        Components::uv(1),
    ] {
        assert!(decl.components.contains(flag));
    }
}

#[test]
fn fat_descriptor_decodes() {
    let Some(mut jit) = jit() else { return };

    let (vcd, vat) = fat_config();

    let mut src = vec![0x41, 0x03];
    // position (16384, -16384, 256) over 2^4
    src.extend_from_slice(&[0x40, 0x00, 0xC0, 0x00, 0x01, 0x00]);
    // nine normal components of 16384, over 2^14
    for _ in 0..9 {
        src.extend_from_slice(&[0x40, 0x00]);
    }
    // colors
    src.extend_from_slice(&[0xF8, 0x00]);
    src.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
    // tex0 (8192, -8192) over 2^2, tex1 128
    src.extend_from_slice(&[0x20, 0x00, 0xE0, 0x00, 0x80]);

    let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &src, 1);
    assert_eq!(emitted, 1);

    assert_eq!(f32_at(&dst, 0), 1024.0);
    assert_eq!(f32_at(&dst, 4), -1024.0);
    assert_eq!(f32_at(&dst, 8), 16.0);

    for vector in 0..3 {
        for lane in 0..3 {
            assert_eq!(f32_at(&dst, 12 + vector * 12 + lane * 4), 1.0);
        }
    }

    assert_eq!(&dst[48..52], &[0xFF, 0x00, 0x00, 0xFF]);
    assert_eq!(&dst[52..56], &[0x01, 0x02, 0x03, 0x04]);

    assert_eq!(f32_at(&dst, 56), 2048.0);
    assert_eq!(f32_at(&dst, 60), -2048.0);
    assert_eq!(f32_at(&dst, 64), 3.0);
    assert_eq!(f32_at(&dst, 68), 128.0);

    assert_eq!(u32_at(&dst, 72), 0x01);
}

#[test]
fn regeneration_is_deterministic() {
    let Some(mut first) = jit() else { return };
    let Some(mut second) = jit() else { return };

    let (vcd, vat) = fat_config();

    let mut src = vec![0u8; 37];
    for (i, byte) in src.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(7);
    }

    let (dst_a, emitted_a) = run(&mut first, &vcd, &vat, &Arrays::default(), 5, &src, 1);
    let (dst_b, emitted_b) = run(&mut second, &vcd, &vat, &Arrays::default(), 5, &src, 1);

    assert_eq!(
        first.loader(&vcd, &vat).vertex_size(),
        second.loader(&vcd, &vat).vertex_size()
    );
    assert_eq!(
        first.loader(&vcd, &vat).native_stride(),
        second.loader(&vcd, &vat).native_stride()
    );
    assert_eq!(emitted_a, emitted_b);
    assert_eq!(dst_a, dst_b);
}

#[test]
fn zero_count_emits_nothing() {
    let Some(mut jit) = jit() else { return };

    let vcd = VertexDescriptor::default().with_position(AttributeMode::Direct);
    let mut vat = VertexAttributeTable::default();
    vat.a = vat.a.with_position(f32_vec3_position());

    let (dst, emitted) = run(&mut jit, &vcd, &vat, &Arrays::default(), 0, &[], 0);
    assert_eq!(emitted, 0);
    assert!(dst.is_empty());
}

#[test]
fn canonicalization_merges_dead_state() {
    let vcd = VertexDescriptor::default().with_position(AttributeMode::Direct);

    let mut plain = VertexAttributeTable::default();
    plain.a = plain.a.with_position(f32_vec3_position());

    // junk in attributes the descriptor does not carry, plus a quantization
    // shift that float positions never read
    let mut noisy = plain;
    noisy.a = noisy
        .a
        .with_position(f32_vec3_position().with_shift(u5::new(11)))
        .with_normal(
            NormalDescriptor::default()
                .with_count(NormalCount::Nbt)
                .with_format(CoordFormat::I16),
        )
        .with_normal_index3(true)
        .with_chan1(
            ColorDescriptor::default()
                .with_kind(ColorKind::Rgba)
                .with_format(ColorFormat::Rgba4444),
        )
        .with_byte_dequant(true);
    noisy = noisy.with_tex(
        3,
        TexCoordDescriptor::default()
            .with_kind(TexCoordKind::St)
            .with_format(CoordFormat::I16)
            .with_shift(u5::new(5)),
    );

    let plain = Config { vcd, vat: plain }.canonicalize();
    let noisy = Config { vcd, vat: noisy }.canonicalize();
    assert_eq!(plain, noisy);
}

#[test]
fn compiles_for_reference_isas() {
    let (vcd, vat) = fat_config();
    let config = Config { vcd, vat }.canonicalize();

    let mut results = Vec::new();
    for (builder, name) in [
        (isa::x86_64_v1(), "x86_64_v1"),
        (isa::x86_64_v3(), "x86_64_v3"),
        (isa::aarch64(), "aarch64"),
    ] {
        let codegen = Codegen::with_isa(builder);
        let mut code_ctx = codegen::Context::new();
        let mut func_ctx = FunctionBuilderContext::new();

        let loader = codegen.compile(&mut code_ctx, &mut func_ctx, config);
        assert!(loader.meta().clir.is_some(), "{name}");
        assert!(loader.meta().disasm.is_some(), "{name}");

        results.push((loader.vertex_size(), loader.native_stride()));
    }

    // layout decisions are ISA independent
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}
