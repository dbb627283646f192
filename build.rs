// SPDX-License-Identifier: Apache-2.0 OR MIT
fn main() {
    // `cargo tarpaulin` sets the `tarpaulin` cfg; timing-sensitive scheduler
    // tests are skipped under it. Declare the cfg so normal builds do not warn
    // about an unexpected name.
    println!("cargo:rustc-check-cfg=cfg(tarpaulin)");
}
