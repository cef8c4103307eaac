use nrbf_format::{Decoder, ReaderOptions};

use crate::cli::ValidateArgs;
use crate::error::{Error, Result};
use crate::util::{format_value, open, wire_ids};

pub fn run(args: ValidateArgs) -> Result<()> {
    let reader = open(&args.file)?;

    let graph = Decoder::new(reader)
        .with_options(ReaderOptions::new().with_max_depth(args.max_depth))
        .decode()
        .map_err(|source| {
            let path = args.file.clone();
            if source.is_truncation() {
                Error::Truncated { path, source }
            } else {
                Error::Decode { path, source }
            }
        })?;

    if !args.quiet {
        let ids = wire_ids(&graph);
        println!(
            "{}: OK ({} objects, root {})",
            args.file.display(),
            graph.len(),
            format_value(graph.root(), &ids)
        );
    }

    Ok(())
}
