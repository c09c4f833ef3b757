mod common;
mod placement;
