//! Environment readiness check.

use crate::config::HarvestConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;

/// Check Chromium availability and that the output and staging roots are
/// writable.
pub async fn run(config: &HarvestConfig) -> Result<()> {
    println!("Harvest Doctor");
    println!("==============");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let browser_ok = match (&config.browser.connect_url, &config.browser.executable) {
        (Some(url), _) => {
            println!("[OK] Attaching to running browser at {url}");
            true
        }
        (None, Some(path)) if path.exists() => {
            println!("[OK] Chromium configured: {}", path.display());
            true
        }
        (None, Some(path)) => {
            println!("[!!] Configured Chromium does not exist: {}", path.display());
            false
        }
        (None, None) => match find_chromium() {
            Some(path) => {
                println!("[OK] Chromium found: {}", path.display());
                true
            }
            None => {
                println!("[!!] Chromium NOT found. Set HARVEST_CHROMIUM_PATH or --connect.");
                false
            }
        },
    };

    let output_ok = report_writable("Output root", &config.output_root);
    let staging_parent = config
        .staging_root
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let staging_ok = report_writable("Staging parent", staging_parent);

    println!();
    if browser_ok && output_ok && staging_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

fn report_writable(label: &str, dir: &Path) -> bool {
    match probe_writable(dir) {
        Ok(()) => {
            println!("[OK] {label} {} is writable", dir.display());
            true
        }
        Err(e) => {
            println!("[!!] {label} {} is not writable: {e}", dir.display());
            false
        }
    }
}

/// Create `dir` if needed and write then remove a probe file in it.
fn probe_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".harvest-probe");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)
}
