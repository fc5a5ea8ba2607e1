//! The baked-in ELF32 image `user_main` execs as the kernel's first user
//! task. Hand-assembled rather than pulled from a build artifact: the boot
//! loader that would normally place a filesystem or a second disk image
//! next to the kernel is out of scope (spec §1), so this crate carries its
//! one demo payload as a byte literal instead of reading one off disk.
//!
//! The program itself is trivial — `exit(42)` — enough to exercise the
//! fork → exec → exit → wait path end to end (spec scenario S1) without
//! needing a real userland runtime linked into the boot image.

/// Virtual address the single `PT_LOAD` segment is mapped at.
const VADDR: u32 = 0x0040_0000;
/// Header region: one `Elf32_Ehdr` (52 bytes) followed by one `Elf32_Phdr`
/// (32 bytes).
const HEADERS_SIZE: u32 = 52 + 32;

/// `mov eax, 0` / `mov ebx, 42` / `int 0x80` — `SYS_exit` with code 42.
const CODE: [u8; 12] = [
    0xB8, 0x00, 0x00, 0x00, 0x00, // mov eax, SYS_EXIT
    0xBB, 0x2A, 0x00, 0x00, 0x00, // mov ebx, 42
    0xCD, 0x80, // int 0x80
];

const FILE_SIZE: u32 = HEADERS_SIZE + CODE.len() as u32;
const ENTRY: u32 = VADDR + HEADERS_SIZE;

const fn le32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

const fn le16(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

/// The full 96-byte ELF32 image, assembled field by field at compile time.
pub static EXIT_42: [u8; FILE_SIZE as usize] = {
    let mut image = [0u8; FILE_SIZE as usize];

    // e_ident: magic, ELFCLASS32, ELFDATA2LSB, EV_CURRENT, rest zero.
    image[0] = 0x7F;
    image[1] = b'E';
    image[2] = b'L';
    image[3] = b'F';
    image[4] = 1; // ELFCLASS32
    image[5] = 1; // ELFDATA2LSB
    image[6] = 1; // EV_CURRENT

    // e_type = ET_EXEC (2)
    let t = le16(2);
    image[16] = t[0];
    image[17] = t[1];
    // e_machine = EM_386 (3)
    let m = le16(3);
    image[18] = m[0];
    image[19] = m[1];
    // e_version = 1
    let v = le32(1);
    image[20] = v[0];
    image[21] = v[1];
    image[22] = v[2];
    image[23] = v[3];
    // e_entry
    let e = le32(ENTRY);
    image[24] = e[0];
    image[25] = e[1];
    image[26] = e[2];
    image[27] = e[3];
    // e_phoff = 52
    let po = le32(52);
    image[28] = po[0];
    image[29] = po[1];
    image[30] = po[2];
    image[31] = po[3];
    // e_shoff = 0 (no sections)
    // e_flags = 0
    // e_ehsize = 52
    let ehs = le16(52);
    image[40] = ehs[0];
    image[41] = ehs[1];
    // e_phentsize = 32
    let pes = le16(32);
    image[42] = pes[0];
    image[43] = pes[1];
    // e_phnum = 1
    let pn = le16(1);
    image[44] = pn[0];
    image[45] = pn[1];
    // e_shentsize/e_shnum/e_shstrndx = 0

    // Elf32_Phdr at offset 52.
    let ph = 52usize;
    // p_type = PT_LOAD (1)
    let pt = le32(1);
    image[ph] = pt[0];
    image[ph + 1] = pt[1];
    image[ph + 2] = pt[2];
    image[ph + 3] = pt[3];
    // p_offset = 0 (the whole file, headers included, is mapped)
    // p_vaddr
    let pv = le32(VADDR);
    image[ph + 8] = pv[0];
    image[ph + 9] = pv[1];
    image[ph + 10] = pv[2];
    image[ph + 11] = pv[3];
    // p_paddr unused, left zero
    // p_filesz
    let pf = le32(FILE_SIZE);
    image[ph + 16] = pf[0];
    image[ph + 17] = pf[1];
    image[ph + 18] = pf[2];
    image[ph + 19] = pf[3];
    // p_memsz
    image[ph + 20] = pf[0];
    image[ph + 21] = pf[1];
    image[ph + 22] = pf[2];
    image[ph + 23] = pf[3];
    // p_flags = R|X (5)
    let pfl = le32(5);
    image[ph + 24] = pfl[0];
    image[ph + 25] = pfl[1];
    image[ph + 26] = pfl[2];
    image[ph + 27] = pfl[3];
    // p_align = 4096
    let pa = le32(4096);
    image[ph + 28] = pa[0];
    image[ph + 29] = pa[1];
    image[ph + 30] = pa[2];
    image[ph + 31] = pa[3];

    // Code, right after the headers.
    let code_off = HEADERS_SIZE as usize;
    let mut i = 0;
    while i < CODE.len() {
        image[code_off + i] = CODE[i];
        i += 1;
    }

    image
};
