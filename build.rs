use anyhow::*;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;
use std::env;
use std::path::PathBuf;

// Ships the viewer's asset bundle (model, environment map, ground texture and
// the compressed-mesh decoder) next to the build output.
fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=assets");
    println!("cargo:rerun-if-env-changed=HOUSE_VIEWER_ASSETS");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let assets_src = match env::var("HOUSE_VIEWER_ASSETS") {
        Result::Ok(dir) => PathBuf::from(dir),
        Err(_) => manifest_dir.join("assets"),
    };
    if !assets_src.exists() {
        println!(
            "cargo:warning=no asset directory at {}, the viewer will start with an empty scene",
            assets_src.display()
        );
        return Ok(());
    }

    let out_dir = env::var("OUT_DIR")?;
    let mut copy_options = CopyOptions::new();
    copy_options.overwrite = true;
    copy_items(&[assets_src], out_dir, &copy_options)?;

    Ok(())
}
