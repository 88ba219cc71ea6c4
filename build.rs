fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Copy WinDivert runtime files (DLL + kernel driver) next to the output binary.
    // Both files must come from the same WinDivert release so the user-mode DLL
    // and the signed kernel driver agree on the IOCTL interface.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    let Ok(out_dir) = std::env::var("OUT_DIR") else {
        println!("cargo:warning=OUT_DIR not set, skipping WinDivert runtime copy");
        return;
    };
    let out_dir = std::path::PathBuf::from(out_dir);
    // OUT_DIR is e.g. target/debug/build/netshaper-xxx/out
    // Walk up to target/debug/ (or target/release/).
    let Some(target_dir) = out_dir.ancestors().nth(3) else {
        println!(
            "cargo:warning=could not determine target dir from {}",
            out_dir.display()
        );
        return;
    };

    for file in ["WinDivert.dll", "WinDivert64.sys"] {
        let src = std::path::Path::new("vendor/windivert").join(file);
        println!("cargo:rerun-if-changed={}", src.display());
        if !src.exists() {
            continue;
        }
        let dst = target_dir.join(file);
        match std::fs::copy(&src, &dst) {
            Ok(_) => println!("cargo:warning=Copied {file} to {}", dst.display()),
            Err(e) => println!("cargo:warning=failed to copy {file} to target dir: {e}"),
        }
    }
}
