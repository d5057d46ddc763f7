pub mod config;
pub mod events;
pub mod sync;

use std::future::Future;

/// Drive an async core operation to completion from a synchronous command.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output, Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(fut))
}
