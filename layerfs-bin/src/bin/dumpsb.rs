#![cfg(not(tarpaulin_include))]
#![allow(clippy::all)]
#![allow(unknown_lints)]
#![allow(require_stability_comment)]

use std::collections::BTreeSet;

use colored::*;
use strum::IntoEnumIterator;

use layerfs::{BlockBuf, Disk, DiskFile, SuperFlag, Superblock, CHECKSUM_OFFSET, SIGNATURE, SUPER_BLOCK};

fn main() {
    let path = std::env::args().nth(1).unwrap();
    let d = DiskFile::open(&path, 0).unwrap();
    let size = d.size().unwrap();
    println!("Image is {} blocks long", size);

    let mut seen = BTreeSet::new();
    let primary = match visit(&d, SUPER_BLOCK, 0, &mut seen) {
        Some(sb) => sb,
        None => return,
    };
    let mut pending = vec![(primary.child_layer(), 1)];
    while let Some((mut block, depth)) = pending.pop() {
        while block != 0 {
            let s = match visit(&d, block, depth, &mut seen) {
                Some(s) => s,
                None => break,
            };
            if s.child_layer() != 0 {
                pending.push((s.child_layer(), depth + 1));
            }
            block = s.next_layer();
        }
    }
}

fn visit(d: &Disk, block: u64, depth: usize, seen: &mut BTreeSet<u64>) -> Option<Superblock> {
    if block >= d.size().unwrap() {
        println!("{}", format!("link to block {} past end of image", block).red());
        return None;
    }
    if !seen.insert(block) {
        println!("{}", format!("block {} already visited", block).red());
        return None;
    }
    let mut buf = BlockBuf::zeroed();
    d.read_block(block, &mut buf).unwrap();
    let s = Superblock::from_block(&buf);
    print_superblock(block, depth, &buf, &s);
    if s.is_valid() {
        Some(s)
    } else {
        None
    }
}

fn print_superblock(block: u64, depth: usize, buf: &BlockBuf, s: &Superblock) {
    let indent = "  ".repeat(depth);
    let kind = if s.is_global() { "Primary superblock" } else { "Layer superblock" };
    println!("{}{} @ {}:", indent, kind, block);
    let raw = buf.as_ref();
    let base = block as usize * layerfs::BLOCK_SIZE;

    let sig = String::from_utf8_lossy(&raw[0..8]).to_string();
    let sig = if raw[0..8] == *SIGNATURE { sig.green() } else { sig.red() };
    print_field(&indent, base, raw, 0, 8, format!("magic:{}", sig));
    print_field(&indent, base, raw, 8, 4, format!("version:{}", s.version()));
    let sum = format!("{:08x}", s.checksum());
    let sum = if Superblock::block_checksum(buf) == buf.get_u32(CHECKSUM_OFFSET) {
        sum.green()
    } else {
        sum.red()
    };
    print_field(&indent, base, raw, CHECKSUM_OFFSET, 4, format!("sum:{}", sum));
    print_field(&indent, base, raw, 16, 8, format!("root:{}", s.root()));

    let mut flags = String::new();
    for f in SuperFlag::iter() {
        let name = format!("{} ", f);
        if s.has_flag(f) {
            flags.push_str(&name.green().to_string());
        } else {
            flags.push_str(&name.dimmed().to_string());
        }
    }
    print_field(&indent, base, raw, 24, 4, flags);
    print_field(&indent, base, raw, 28, 8, format!("ctime:{}", s.ctime()));
    print_field(&indent, base, raw, 36, 8, format!("atime:{}", s.atime()));
    print_field(&indent, base, raw, 44, 8, format!("commit:{}", s.commit_time()));
    print_field(&indent, base, raw, 52, 8, link("next", s.next_layer()));
    print_field(&indent, base, raw, 60, 8, link("child", s.child_layer()));
    print_field(&indent, base, raw, 68, 8, link("inodes", s.inode_block()));
    print_field(&indent, base, raw, 76, 8, link("extents", s.extent_block()));
    if s.is_global() {
        print_field(&indent, base, raw, 84, 8, format!("blocks:{}", s.blocks()));
        print_field(&indent, base, raw, 92, 8, format!("next_ino:{}", s.next_inode()));
        print_field(&indent, base, raw, 100, 8, format!("inodes:{}", s.inodes()));
        print_field(&indent, base, raw, 108, 8, format!("total:{}", s.total_blocks()));
    }
}

fn link(name: &str, block: u64) -> String {
    match block {
        0 => format!("{}:NULL", name),
        layerfs::INVALID_BLOCK => format!("{}:INVALID", name),
        b => format!("{}:{:08x}", name, b),
    }
}

fn print_field(indent: &str, base: usize, raw: &[u8], off: usize, len: usize, desc: String) {
    print!("{}\t{:08x} : ", indent, base + off);
    for i in 0..8 {
        if i < len {
            print!("{:02x} ", raw[off + i]);
        } else {
            print!("   ");
        }
    }
    println!("| {}", desc);
}
