//! Build script for the drawscan CLI
//!
//! Records build metadata and the tessdata directory baked in as the
//! `--tessdata` fallback.

use std::env;

fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    println!("cargo:rerun-if-env-changed=GIT_COMMIT_HASH");
    println!("cargo:rerun-if-env-changed=DRAWSCAN_TESSDATA");

    println!(
        "cargo:rustc-env=BUILT_GIT_COMMIT_HASH={}",
        env::var("GIT_COMMIT_HASH").unwrap_or_else(|_| "unknown".to_string())
    );
    println!(
        "cargo:rustc-env=BUILT_TIME_UTC={}",
        chrono::Utc::now().to_rfc3339()
    );

    // Empty means let Tesseract use its compiled-in search path
    let tessdata = env::var("DRAWSCAN_TESSDATA").unwrap_or_default();
    let label = if tessdata.is_empty() {
        "system default"
    } else {
        tessdata.as_str()
    };
    println!("cargo:rustc-env=DRAWSCAN_TESSDATA={}", tessdata);
    println!("cargo:rustc-env=DRAWSCAN_TESSDATA_LABEL={}", label);
}
