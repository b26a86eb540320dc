use cygnet::logging::init_logging;
use cygnet::simulations;
use std::env;

/// Without arguments, main runs the default simulation.
fn main() {
    println!("Cygnet v{}", env!("CARGO_PKG_VERSION"));
    if let Err(error) = init_logging("cygnet.log") {
        eprintln!("logging disabled: {}", error);
    }
    simulations::switched_ping();
    println!("Done");
}
