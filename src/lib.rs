// Crate-wide clippy allowances
#![allow(
    clippy::collapsible_if,
    clippy::needless_lifetimes,
    clippy::too_many_arguments
)]

/// Use mimalloc as the global allocator for all binaries.
/// Sorting allocates one String per record; mimalloc's thread-local
/// caching keeps that cheap across the merge workers.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod extsort;
