//! Exports the GraphQL API schema. The schema is required for frontends to
//! compile their queries against.

use std::path::PathBuf;

use crate::{api, prelude::*};


#[derive(Debug, clap::Args)]
pub(crate) struct Args {
    /// Target file. If not specified, the schema is written to stdout.
    target: Option<PathBuf>,
}

pub(crate) fn run(args: &Args) -> Result<()> {
    let schema = api::root_node().as_sdl();

    match &args.target {
        Some(target) => {
            std::fs::write(target, schema)
                .context(format!("failed to write schema to '{}'", target.display()))?;
            info!("Wrote API schema to '{}'", target.display());
        }
        None => println!("{}", schema),
    }

    Ok(())
}
