use regex::Regex;
use std::process::Command;

fn main() {
    let knock_build =
        get_version().unwrap_or_else(|_| format!("{} (Cargo)", env!("CARGO_PKG_VERSION")));

    println!("cargo:rustc-env=KNOCK_BUILD={}", &knock_build);
}

fn get_version() -> Result<String, Box<dyn std::error::Error>> {
    let re = Regex::new(r"v([0-9.]+)-([0-9]+)-g([a-f0-9]+)")?;
    let output = Command::new("git")
        .args(["describe", "--tags", "--abbrev=7"])
        .output()?;

    if !output.status.success() {
        return Err("git describe failed".into());
    }

    let output_str = String::from_utf8(output.stdout)?;
    let version = re.replace_all(output_str.trim(), "${1}.r${2}.${3}");
    if version.is_empty() {
        return Err("empty version".into());
    }

    Ok(version.into_owned())
}
