use std::path::PathBuf;
use std::process::Command;

const STUB_INDEX: &str = "<!doctype html><html><head><title>md2slack</title></head><body>\
<h1>Workspace</h1>\
<p>Frontend not built. Run <code>npm install &amp;&amp; npm run build</code> \
inside the <code>frontend/</code> directory.</p>\
</body></html>";

fn main() {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    let frontend_dir = manifest_dir.join("../../frontend");
    let real_dist = frontend_dir.join("dist");

    for rel in [
        "src",
        "package.json",
        "package-lock.json",
        "vite.config.js",
        "svelte.config.js",
    ] {
        println!(
            "cargo:rerun-if-changed={}",
            frontend_dir.join(rel).display()
        );
    }
    println!(
        "cargo:rerun-if-changed={}",
        real_dist.join("index.html").display()
    );

    // A pre-built dist wins over everything else.
    if real_dist.join("index.html").exists() {
        println!("cargo:rustc-env=MD2SLACK_FRONTEND_DIST={}", real_dist.display());
        return;
    }

    // MD2SLACK_NO_NPM=1 skips the npm step and embeds a stub page.
    println!("cargo:rerun-if-env-changed=MD2SLACK_NO_NPM");
    if std::env::var("MD2SLACK_NO_NPM").is_ok() {
        let stub_dir = write_stub(&out_dir);
        println!("cargo:rustc-env=MD2SLACK_FRONTEND_DIST={}", stub_dir.display());
        println!("cargo:warning=MD2SLACK_NO_NPM set, md2slack-server will serve a stub UI");
        return;
    }

    let npm = if cfg!(target_os = "windows") {
        "npm.cmd"
    } else {
        "npm"
    };

    // `npm ci` needs a lockfile; fresh checkouts without one resolve from package.json.
    let install = if frontend_dir.join("package-lock.json").exists() {
        "ci"
    } else {
        "install"
    };
    let built = Command::new(npm)
        .args([install])
        .current_dir(&frontend_dir)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
        && Command::new(npm)
            .args(["run", "build"])
            .current_dir(&frontend_dir)
            .status()
            .map(|s| s.success())
            .unwrap_or(false);

    if built {
        println!("cargo:rustc-env=MD2SLACK_FRONTEND_DIST={}", real_dist.display());
    } else {
        // Stub into OUT_DIR so the RustEmbed derive always has a folder.
        let stub_dir = write_stub(&out_dir);
        println!("cargo:rustc-env=MD2SLACK_FRONTEND_DIST={}", stub_dir.display());
        println!(
            "cargo:warning=frontend/dist not found and npm build skipped, \
             md2slack-server will serve a stub UI"
        );
    }
}

fn write_stub(out_dir: &std::path::Path) -> PathBuf {
    let stub_dir = out_dir.join("frontend-dist");
    std::fs::create_dir_all(&stub_dir).expect("create stub frontend-dist dir");
    std::fs::write(stub_dir.join("index.html"), STUB_INDEX).expect("write stub index.html");
    stub_dir
}
