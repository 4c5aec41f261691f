//! Our own prelude that is wildcard imported in every other module. That way,
//! commonly used symbols are easily available.

pub(crate) use anyhow::{anyhow, bail, Context as _, Result};
pub(crate) use futures::TryStreamExt as _;
pub(crate) use tap::Pipe as _;
pub(crate) use tracing::{error, warn, info, debug, trace};
