#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use clap::Parser;
#[cfg(not(target_arch = "wasm32"))]
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};
#[cfg(not(target_arch = "wasm32"))]
use tiny_http::{Header, Response, Server, StatusCode};

/// Serves the board page and the wasm bundle built next to it.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Parser, Debug)]
struct Opts {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,
    /// Directory holding index.html, main.js and the wasm-pack output
    #[arg(long, default_value = "web")]
    root: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let root = opts.root.canonicalize().map_err(|e| {
        anyhow::anyhow!("web directory not found at {}: {e}", opts.root.display())
    })?;

    println!("Serving {} on http://{}", root.display(), opts.addr);
    let server = Server::http(&opts.addr).map_err(|e| anyhow::anyhow!("bind {}: {e}", opts.addr))?;
    for request in server.incoming_requests() {
        let url = request.url().to_string();
        let method = request.method().to_string();
        let found = resolve_path(&root, url.split('?').next().unwrap_or("/"))
            .and_then(|path| fs::File::open(&path).ok().map(|file| (path, file)));
        let status = match found {
            Some((path, file)) => {
                let mut resp = Response::from_file(file).with_status_code(StatusCode(200));
                if let Ok(h) = Header::from_bytes("Content-Type", content_type_for(&path).as_bytes()) {
                    resp.add_header(h);
                }
                let _ = request.respond(resp);
                200
            }
            None => {
                let _ = request.respond(Response::from_string("Not Found").with_status_code(StatusCode(404)));
                404
            }
        };
        println!("{} {} -> {}", method, url, status);
    }
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn resolve_path(root: &Path, url: &str) -> Option<PathBuf> {
    let rel = url.trim_start_matches('/');
    let rel = if rel.is_empty() { "index.html" } else { rel };
    let full = root.join(rel);
    let path = if full.is_dir() {
        full.join("index.html")
    } else {
        full
    };
    // `..` segments are resolved before the prefix check.
    let path = path.canonicalize().ok()?;
    if path.is_file() && path.starts_with(root) {
        Some(path)
    } else {
        None
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "js" => "application/javascript",
        "css" => "text/css",
        "wasm" => "application/wasm",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
