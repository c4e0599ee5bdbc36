// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Flowsheet MCP CLI entrypoint.
//!
//! By default this serves MCP over streamable HTTP at `http://127.0.0.1:8005/mcp`.
//!
//! Use `--mcp` to run the MCP server over stdio instead (intended for tool integrations).
//! Logs always go to stderr.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use flowsheet_mcp::mcp::{FlowsheetMcp, ServerSettings};
use flowsheet_mcp::model::{fixtures, Flowsheet};
use flowsheet_mcp::solve::{SolverRegistry, DEFAULT_BACKEND};
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8005;
const DEFAULT_DEMO: &str = "valve";
const DEFAULT_LOG_FILTER: &str = "flowsheet_mcp=info";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [<model.json>] [--host <addr>] [--port <port>] [--solver <id>] [--root-alias <name>]\n  {program} [--model <model.json>] [--mcp] [--solver <id>] [--root-alias <name>]\n  {program} --demo <valve|heater> [--mcp] [--host <addr>] [--port <port>]\n\nServes MCP over streamable HTTP at `http://<host>:<port>/mcp` (default {DEFAULT_HOST}:{DEFAULT_PORT}).\n--mcp serves over stdio instead and cannot be combined with --host/--port.\n\nWithout a model file the built-in `{DEFAULT_DEMO}` demo flowsheet is used.\n--solver selects the default solver backend (default `{DEFAULT_BACKEND}`).\n--root-alias sets the optional root prefix accepted in component paths (default `m`).\n\nLog filtering follows RUST_LOG (default `{DEFAULT_LOG_FILTER}`)."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    mcp: bool,
    model: Option<String>,
    demo: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    solver: Option<String>,
    root_alias: Option<String>,
}

fn set_once<T>(slot: &mut Option<T>, value: Option<T>) -> Result<(), ()> {
    if slot.is_some() {
        return Err(());
    }
    *slot = Some(value.ok_or(())?);
    Ok(())
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mcp" => {
                if options.mcp {
                    return Err(());
                }
                options.mcp = true;
            }
            "--model" => set_once(&mut options.model, args.next())?,
            "--demo" => set_once(&mut options.demo, args.next())?,
            "--host" => set_once(&mut options.host, args.next())?,
            "--port" => {
                let port = args.next().ok_or(())?.parse::<u16>().map_err(|_| ())?;
                set_once(&mut options.port, Some(port))?;
            }
            "--solver" => set_once(&mut options.solver, args.next())?,
            "--root-alias" => set_once(&mut options.root_alias, args.next())?,
            _ if arg.starts_with('-') => return Err(()),
            _ => set_once(&mut options.model, Some(arg))?,
        }
    }

    if options.demo.is_some() && options.model.is_some() {
        return Err(());
    }

    if options.mcp && (options.port.is_some() || options.host.is_some()) {
        return Err(());
    }

    Ok(options)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_model(options: &CliOptions) -> Result<Flowsheet, Box<dyn Error>> {
    let mut model = match &options.model {
        Some(path) => flowsheet_mcp::store::load_model(Path::new(path))?,
        None => {
            let name = options.demo.as_deref().unwrap_or(DEFAULT_DEMO);
            let demo = fixtures::demo(name).ok_or_else(|| {
                format!("unknown demo '{name}' (available: {})", fixtures::DEMO_NAMES.join(", "))
            })?;
            tracing::info!(demo = name, "using built-in demo flowsheet");
            demo?
        }
    };
    if let Some(alias) = &options.root_alias {
        model.set_root_alias(alias);
    }
    Ok(model)
}

async fn serve_http(mcp: FlowsheetMcp, host: &str, port: u16) -> Result<(), Box<dyn Error>> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;

    let config = StreamableHttpServerConfig { stateful_mode: true, ..StreamableHttpServerConfig::default() };
    let session_manager = Arc::new(LocalSessionManager::default());
    let mcp_service = StreamableHttpService::new(move || Ok(mcp.clone()), session_manager, config);

    let router = Router::new().nest_service("/mcp", mcp_service);
    tracing::info!(address = %listener.local_addr()?, "serving MCP over streamable HTTP at /mcp");
    axum::serve(listener, router).await?;
    Ok(())
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "flowsheet-mcp".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };

        init_tracing();

        let model = load_model(&options)?;
        let solvers = SolverRegistry::default();
        let default_backend = options.solver.clone().unwrap_or_else(|| DEFAULT_BACKEND.to_owned());
        if solvers.get(&default_backend).is_none() {
            return Err(format!(
                "unknown solver backend '{default_backend}' (available: {})",
                solvers.names().join(", ")
            )
            .into());
        }
        let settings = ServerSettings { default_backend, ..ServerSettings::default() };
        tracing::info!(
            variables = model.variable_count(),
            constraints = model.constraint_count(),
            dof = model.degrees_of_freedom(),
            backend = %settings.default_backend,
            "model ready"
        );
        let mcp = FlowsheetMcp::with_solvers(model, settings, solvers);

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        if options.mcp {
            runtime.block_on(mcp.serve_stdio())?;
            return Ok(());
        }

        let host = options.host.as_deref().unwrap_or(DEFAULT_HOST);
        let port = options.port.unwrap_or(DEFAULT_PORT);
        runtime.block_on(serve_http(mcp, host, port))
    })();

    if let Err(err) = result {
        eprintln!("flowsheet-mcp: {err}");
        std::process::exit(1);
    }
}
