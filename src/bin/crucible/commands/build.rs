//! `crucible build` - run one toolchain build request.

use anyhow::Result;

use crucible::ops::build::{execute as build_execute, BuildOptions};

use crate::cli::BuildArgs;

pub fn execute(args: BuildArgs, verbose: bool) -> Result<()> {
    let request = args.to_request()?;

    build_execute(BuildOptions {
        request,
        dry_run: args.dry_run,
        json_events: args.message_format.as_deref() == Some("json"),
        verbose,
    })
}
