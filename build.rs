use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const KEY_PREFIX: &str = "STITCH_";
const TEST_MARKER: &str = "#[cfg(test)]";

fn rust_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Every `"STITCH_*"` string literal read by non-test code.
fn env_key_literals(source: &str) -> Vec<&str> {
    let live = source.find(TEST_MARKER).map_or(source, |cut| &source[..cut]);
    let opener = format!("\"{KEY_PREFIX}");
    live.match_indices(opener.as_str())
        .filter_map(|(at, _)| {
            let rest = &live[at + 1..];
            let key = &rest[..rest.find('"')?];
            let is_key = key.len() > KEY_PREFIX.len()
                && key
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
            is_key.then_some(key)
        })
        .collect()
}

fn write_allowlist(keys: &BTreeSet<String>) -> std::io::Result<()> {
    let out_dir = env::var_os("OUT_DIR").ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR is not set")
    })?;
    let mut f = fs::File::create(Path::new(&out_dir).join("stitch_env_allowlist.rs"))?;
    writeln!(f, "pub const GENERATED_STITCH_ENV_ALLOWLIST: &[&str] = &[")?;
    for key in keys {
        writeln!(f, "    {key:?},")?;
    }
    writeln!(f, "];")
}

fn main() -> std::io::Result<()> {
    let mut keys = BTreeSet::new();
    for file in rust_sources(Path::new("src"))? {
        let source = fs::read_to_string(&file)?;
        keys.extend(env_key_literals(&source).into_iter().map(str::to_string));
    }
    write_allowlist(&keys)?;

    let build_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|now| format!("{:x}-{:x}", now.as_secs(), now.subsec_nanos()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BUILD_UUID={build_id}");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
