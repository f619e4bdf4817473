#![allow(unknown_lints)]
#![allow(require_stability_comment)]
#![cfg(not(tarpaulin_include))]
use layerfs::{operations::mkfs, DiskFile};

fn main() {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "test.img".to_string());
    let blocks = args.next().map_or(1024, |b| b.parse().unwrap());
    let d = DiskFile::open(&path, blocks).unwrap();
    mkfs(&d, true).unwrap();
}
