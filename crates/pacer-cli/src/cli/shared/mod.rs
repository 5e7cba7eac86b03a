use super::*;

mod io_render;
mod setup;
mod sync_ops;

pub(in crate::cli) use io_render::*;
pub(in crate::cli) use setup::*;
pub(in crate::cli) use sync_ops::*;
