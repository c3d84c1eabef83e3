#![allow(missing_docs)]

fn main() -> anyhow::Result<()> {
    marketplace_ops_lib::run()
}
