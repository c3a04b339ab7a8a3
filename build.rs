//! Build script rendering the `scenario-sim(1)` manual page.
//!
//! The page is generated from the clap definition in `src/cli.rs`, extended
//! with a section describing the line protocol the binary reads on stdin.

use std::{fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

const INPUT_FORMAT: &str = "\
Each line on standard input is one JSON document.

A launch request names a scenario and optional parameters:
  {\"launch\": \"UpdateFaxStatus\", \"parameters\": [{\"name\": \"referenceId\", \"value\": \"7\"}]}

Any other document is routed as an inbound message:
  {\"headers\": {\"scenario\": \"HelloStarter\"}, \"payload\": \"hi\"}

Outbound messages are written to standard output as JSON lines. Logs go to \
standard error and are filtered by RUST_LOG.";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-changed=build.rs");

    let man_dir = PathBuf::from("target").join("generated-man");
    fs::create_dir_all(&man_dir)?;

    let cmd = cli::Cli::command().after_long_help(INPUT_FORMAT);
    let page = Man::new(cmd)
        .manual("Scenario Simulator")
        .source(format!("scenario-sim {}", env!("CARGO_PKG_VERSION")));
    let mut rendered = Vec::new();
    page.render(&mut rendered)?;
    fs::write(man_dir.join("scenario-sim.1"), rendered)?;

    Ok(())
}
