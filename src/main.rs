use std::fs::read_to_string;
use std::iter::once;

use depot_select::{Adjustment, Network, report::Report};

const PAINT_NETWORK: &str = include_str!("../data/paint_network.yaml");

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Usage: <program> [network.yaml]
    let buf = match std::env::args().nth(1) {
        Some(path) => read_to_string(path)?,
        None => PAINT_NETWORK.to_owned(),
    };
    let network = Network::from_yaml(&buf)?;

    // Base model first, then the rent variant if the network has one
    let variants = once(Adjustment::None).chain(Adjustment::rental(&network));
    for (i, adjustment) in variants.enumerate() {
        let outcome = network.solve_with(&adjustment)?;
        if i > 0 {
            println!();
        }
        print!("{}", Report::new(&adjustment, &outcome));
    }
    Ok(())
}
