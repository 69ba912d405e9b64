//! Linker scenarios: merging, placement, symbol resolution, relocation
//! patching, and the failure modes.

use ingot_object::{link, serialize, Layout, LinkError, ObjectFile};

fn object_with_text(len: usize) -> ObjectFile {
    let mut obj = ObjectFile::new();
    obj.get_section(".text").add_data(&vec![0u8; len]);
    obj
}

#[test]
fn rel8_resolution_across_files() {
    let mut o1 = object_with_text(100);
    o1.add_relocation("a", 0, "rel8", ".text");
    let mut o2 = object_with_text(100);
    o2.add_symbol("a", 24, ".text").unwrap();

    let image = link(&[o1, o2], &Layout::new(), "arm").unwrap();

    // O1's bytes come first, then O2's, so `a` lands at 100 + 24.
    let text = image.section(".text").unwrap();
    assert_eq!(text.size(), 200);
    assert_eq!(image.symbol_value("a"), Some(124));
    // rel8 encodes (124 - 4) / 2 half-words into the byte at the site.
    assert_eq!(text.data()[0], 60);
    assert!(image.relocations().is_empty());
}

#[test]
fn symbol_values_after_merge() {
    let mut o1 = object_with_text(108);
    o1.add_symbol("b", 24, ".text").unwrap();
    let mut o2 = object_with_text(100);
    o2.add_symbol("a", 2, ".text").unwrap();

    let image = link(&[o1, o2], &Layout::new(), "arm").unwrap();

    assert_eq!(image.symbol_value("a"), Some(110));
    assert_eq!(image.symbol_value("b"), Some(24));
    assert_eq!(image.section(".text").unwrap().size(), 208);
}

#[test]
fn memory_layout_with_two_regions() {
    let spec = "
        MEMORY flash LOCATION=0x08000000 SIZE=0x3000 {
          SECTION(code)
        }
        MEMORY ram LOCATION=0x20000000 SIZE=0x3000 {
          SECTION(data)
        }
    ";
    let layout: Layout = spec.parse().unwrap();

    let mut o1 = ObjectFile::new();
    o1.get_section("code").add_data(&[0; 108]);
    o1.add_symbol("b", 24, "code").unwrap();
    let mut o2 = ObjectFile::new();
    o2.get_section("code").add_data(&[0; 100]);
    o2.get_section("data").add_data(&[0; 100]);
    o2.add_symbol("a", 2, "data").unwrap();
    o2.add_symbol("c", 2, "code").unwrap();

    let image = link(&[o1, o2], &layout, "arm").unwrap();

    assert_eq!(image.symbol_value("a"), Some(0x2000_0002));
    assert_eq!(image.symbol_value("b"), Some(0x0800_0018));
    assert_eq!(image.symbol_value("c"), Some(0x0800_006e));
    assert_eq!(image.section("code").unwrap().size(), 208);
    assert_eq!(image.section("data").unwrap().size(), 100);
    assert_eq!(image.section("code").unwrap().base, Some(0x0800_0000));
    assert_eq!(image.section("data").unwrap().base, Some(0x2000_0000));
}

#[test]
fn align_directive_advances_cursor() {
    let spec = "
        MEMORY flash LOCATION=0x100 SIZE=0x1000 {
          SECTION(code)
          ALIGN(32)
          SECTION(rodata)
        }
    ";
    let layout: Layout = spec.parse().unwrap();

    let mut obj = ObjectFile::new();
    obj.get_section("code").add_data(&[0; 10]);
    obj.get_section("rodata").add_data(&[0; 4]);
    obj.add_symbol("lit", 0, "rodata").unwrap();

    let image = link(&[obj], &layout, "arm").unwrap();

    // code: 0x100..0x10a, then the cursor aligns up to 0x120.
    assert_eq!(image.section("rodata").unwrap().base, Some(0x120));
    assert_eq!(image.symbol_value("lit"), Some(0x120));
}

#[test]
fn unplaced_sections_start_at_zero() {
    let spec = "MEMORY flash LOCATION=0x08000000 SIZE=0x3000 { SECTION(code) }";
    let layout: Layout = spec.parse().unwrap();

    let mut obj = ObjectFile::new();
    obj.get_section("code").add_data(&[0; 16]);
    obj.get_section("extra1").add_data(&[0; 8]);
    obj.get_section("extra2").add_data(&[0; 8]);
    obj.add_symbol("x", 4, "extra2").unwrap();

    let image = link(&[obj], &layout, "arm").unwrap();

    assert_eq!(image.section("extra1").unwrap().base, Some(0));
    assert_eq!(image.section("extra2").unwrap().base, Some(8));
    assert_eq!(image.symbol_value("x"), Some(12));
}

#[test]
fn duplicate_symbol() {
    let mut o1 = ObjectFile::new();
    o1.get_section(".text");
    o1.add_symbol("a", 0, ".text").unwrap();
    let mut o2 = ObjectFile::new();
    o2.get_section(".text");
    o2.add_symbol("a", 0, ".text").unwrap();

    let err = link(&[o1, o2], &Layout::new(), "arm").unwrap_err();
    assert!(matches!(err, LinkError::DuplicateSymbol(name) if name == "a"));
}

#[test]
fn undefined_symbol() {
    let mut o1 = ObjectFile::new();
    o1.get_section(".text").add_data(&[0; 4]);
    o1.add_relocation("undefined_sym", 0, "rel8", ".text");
    let o2 = ObjectFile::new();

    let err = link(&[o1, o2], &Layout::new(), "arm").unwrap_err();
    assert!(matches!(err, LinkError::UndefinedSymbol(name) if name == "undefined_sym"));
}

#[test]
fn unknown_relocation_kind() {
    let mut o1 = ObjectFile::new();
    o1.get_section(".text").add_data(&[0; 4]);
    o1.add_symbol("a", 0, ".text").unwrap();
    o1.add_relocation("a", 0, "imm12_dummy", ".text");

    let err = link(&[o1], &Layout::new(), "arm").unwrap_err();
    assert!(matches!(err, LinkError::UnknownRelocation { kind, .. } if kind == "imm12_dummy"));
}

#[test]
fn relocation_out_of_range() {
    // `a` sits a kilobyte after the site; rel8 only reaches 254 bytes.
    let mut o1 = ObjectFile::new();
    o1.get_section(".text").add_data(&vec![0u8; 2048]);
    o1.add_symbol("a", 2000, ".text").unwrap();
    o1.add_relocation("a", 0, "rel8", ".text");

    let err = link(&[o1], &Layout::new(), "arm").unwrap_err();
    match err {
        LinkError::RelocationOutOfRange {
            symbol,
            offset,
            kind,
            ..
        } => {
            assert_eq!(symbol, "a");
            assert_eq!(offset, 0);
            assert_eq!(kind, "rel8");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn section_overflows_region() {
    let spec = "MEMORY tiny LOCATION=0x0 SIZE=0x10 { SECTION(code) }";
    let layout: Layout = spec.parse().unwrap();
    let mut obj = ObjectFile::new();
    obj.get_section("code").add_data(&[0; 32]);

    let err = link(&[obj], &layout, "arm").unwrap_err();
    assert!(matches!(
        err,
        LinkError::RegionOverflow { region, section }
            if region == "tiny" && section == "code"
    ));
}

#[test]
fn unsupported_target() {
    let err = link(&[], &Layout::new(), "m68k-next-nextstep").unwrap_err();
    assert!(matches!(err, LinkError::UnsupportedTarget(_)));
}

#[test]
fn linking_is_deterministic() {
    let build_inputs = || {
        let mut o1 = object_with_text(100);
        o1.add_relocation("a", 0, "rel8", ".text");
        o1.get_section(".data").add_data(&[1, 2, 3]);
        let mut o2 = object_with_text(100);
        o2.add_symbol("a", 24, ".text").unwrap();
        vec![o1, o2]
    };
    let layout: Layout = "MEMORY flash LOCATION=0x0 SIZE=0x1000 { SECTION(.text) }"
        .parse()
        .unwrap();

    let image1 = link(&build_inputs(), &layout, "arm").unwrap();
    let image2 = link(&build_inputs(), &layout, "arm").unwrap();
    assert_eq!(image1, image2);
    assert_eq!(serialize(&image1), serialize(&image2));
}

#[test]
fn riscv_branch_patching() {
    // A B-type branch at offset 0 targeting a symbol 8 bytes ahead.
    let mut obj = ObjectFile::new();
    obj.get_section(".text").add_data(&[0; 12]);
    obj.add_symbol("target", 8, ".text").unwrap();
    obj.add_relocation("target", 0, "b_imm12", ".text");

    let image = link(&[obj], &Layout::new(), "riscv").unwrap();
    assert_eq!(&image.section(".text").unwrap().data()[..4], &[0x00, 0x04, 0x00, 0x00]);
}
