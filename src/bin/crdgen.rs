//! CRD YAML Generator
//!
//! Prints the CRD manifests of every custom resource the
//! kafka-connect-operator reads or writes.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use kafka_connect_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
