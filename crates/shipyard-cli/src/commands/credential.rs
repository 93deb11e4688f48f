//! Hidden `credential-helper` command invoked by git during a push.

use anyhow::{Context, Result};

pub fn run(operation: &str) -> Result<()> {
    shipyard_transport::credential::run(operation)
        .with_context(|| format!("credential helper failed for '{}'", operation))
}
