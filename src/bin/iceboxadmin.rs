//! iceboxadmin - administrative client for the icebox service container
//!
//! Invokes operations on the container's `ServiceManager` object over the
//! administrative endpoint. The endpoint is given directly with
//! `--endpoints` or read from the container's property file with `--config`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use icebox::adapter::parse_endpoint;
use icebox::properties::Properties;
use icebox::protocol::{self, Request, Response};

#[derive(Parser)]
#[command(name = "iceboxadmin")]
#[command(about = "Control a running icebox service container")]
struct Args {
    /// Administrative endpoint, e.g. "tcp -h 127.0.0.1 -p 9090"
    #[arg(short, long, global = true)]
    endpoints: Option<String>,

    /// Read IceBox.ServiceManager.Endpoints from this property file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Shut the container down in an orderly fashion
    Shutdown,
}

fn main() {
    let args = Args::parse();

    let endpoints = match resolve_endpoints(&args) {
        Ok(endpoints) => endpoints,
        Err(message) => {
            eprintln!("iceboxadmin: {}", message);
            std::process::exit(1);
        }
    };

    let addr = match parse_endpoint(&endpoints) {
        Ok((host, port)) => format!("{}:{}", host, port),
        Err(e) => {
            eprintln!("iceboxadmin: {}", e);
            std::process::exit(1);
        }
    };

    let request = match args.command {
        Command::Shutdown => Request::Shutdown,
    };

    match protocol::call(&addr, &request) {
        Ok(Response::Ok) => {} // Silent success
        Ok(Response::Error(message)) => {
            eprintln!("error: {}", message);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("iceboxadmin: container not reachable at {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

fn resolve_endpoints(args: &Args) -> Result<String, String> {
    if let Some(endpoints) = &args.endpoints {
        return Ok(endpoints.clone());
    }
    if let Some(path) = &args.config {
        let mut properties = Properties::new();
        properties.load(path).map_err(|e| e.to_string())?;
        let endpoints = properties.get("IceBox.ServiceManager.Endpoints");
        if endpoints.is_empty() {
            return Err(format!(
                "{}: IceBox.ServiceManager.Endpoints is not set",
                path.display()
            ));
        }
        return Ok(endpoints.to_string());
    }
    Err("no endpoint given; pass --endpoints or --config".to_string())
}
