//! # Switchback Demo
//!
//! Small server showing groups, middleware, panic recovery and static files.
//!
//! Configure with `SWITCHBACK_MODE`, `SWITCHBACK_PREFIX_MATCH`,
//! `SWITCHBACK_ADDR` and `RUST_LOG`.

use anyhow::Context as _;
use serde_json::json;
use std::net::SocketAddr;
use switchback_core::{Config, Context, Engine, Handler, Routes, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("switchback_core=info,switchback_demo=info"))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
    Ok(())
}

fn require_token() -> Handler {
    Handler::named("require_token", |c: &mut Context| {
        if c.header("authorization").is_none() {
            c.abort_with_status_json(401, &json!({ "message": "missing token" }));
        }
    })
}

fn build_engine(config: Config) -> anyhow::Result<Engine> {
    let mut engine = Engine::with_defaults(config);

    engine.get("/", |c| c.string(200, "switchback\n"))?;
    engine.get("/panic", |_| panic!("demo panic"))?;
    engine.static_files("/assets", "./public")?;

    {
        let mut v1 = engine.group("/v1", Vec::new());
        v1.get("/items/:id", |c| match c.params.parse::<u64>("id") {
            Some(id) => c.api_success(0, "ok", &json!({ "id": id })),
            None => c.api_error(1, "id must be a number"),
        })?;
        v1.get("/files/*path", |c| {
            let body = format!("file: {}\n", c.param("path"));
            c.string(200, body);
        })?;

        let mut admin = v1.group("/admin", vec![require_token()]);
        admin.post("/reset", |c| c.json(200, &json!({ "reset": true })))?;
    }

    Ok(engine)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = Config::from_env()?;
    let addr: SocketAddr = std::env::var("SWITCHBACK_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8000".to_string())
        .parse()
        .context("SWITCHBACK_ADDR is not a socket address")?;

    let engine = build_engine(config)?;
    info!(mode = %config.mode, routes = engine.route_table().len(), "engine ready");

    Server::new(engine).bind(addr).serve().await?;
    Ok(())
}
