#![cfg(not(tarpaulin_include))]
#![allow(clippy::all)]
#![allow(unknown_lints)]
#![allow(require_stability_comment)]

use layerfs::{operations::check_forest, DiskFile};

fn main() {
    layerfs::test::logging::init_log();

    let path = std::env::args().nth(1).unwrap();
    let d = DiskFile::open(&path, 0).unwrap();
    let report = check_forest(&d).unwrap();
    for e in &report.errors {
        println!("block {}: {:?}", e.block, e.kind);
    }
    println!(
        "{} layer(s), {} superblock block(s) referenced",
        report.layers,
        report.referenced()
    );
    if !report.is_clean() {
        std::process::exit(1);
    }
}
