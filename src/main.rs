#[macro_use]
extern crate tracing;

use p2v_xml::machine::{DataConn, Machine};
use p2v_xml::physical::generate_physical_xml;
use p2v_xml::SETTINGS;
use std::env;
use std::path::PathBuf;
use std::process::exit;

fn main() {
    // setup logging
    {
        let settings = SETTINGS.read().unwrap();
        match settings.get_string("log_level") {
            Ok(s) => env::set_var("RUST_LOG", s),
            Err(_) => env::set_var("RUST_LOG", "info"),
        }
    }
    tracing_subscriber::fmt::init();

    info!(
        "p2v-xml {} {}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let settings = SETTINGS.read().unwrap();
    let machine: Machine = match settings.get("machine") {
        Ok(m) => m,
        Err(e) => {
            error!("could not load the machine description: {e}");
            exit(1);
        }
    };
    let ports: Vec<u16> = match settings.get("nbd_ports") {
        Ok(p) => p,
        // a machine without disks has no data connections
        Err(config::ConfigError::NotFound(_)) => vec![],
        Err(e) => {
            error!("could not load nbd_ports: {e}");
            exit(1);
        }
    };
    let data_conns: Vec<DataConn> = ports
        .iter()
        .map(|p| DataConn {
            nbd_remote_port: *p,
        })
        .collect();
    let output = settings
        .get_string("output")
        .unwrap_or_else(|_| "physical.xml".to_string());

    if let Err(e) = generate_physical_xml(&machine, &data_conns, &PathBuf::from(&output)) {
        error!("{output}: {e:#}");
        exit(1);
    }
    info!("wrote {output}");
}
