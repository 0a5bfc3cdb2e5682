//! # ruapc-mempool
//!
//! A region-based memory pool: many small allocations are carved from a chain
//! of pre-reserved blocks and released all at once when the pool is destroyed.
//! This crate is part of the [ruapc](https://github.com/SF-Zhou/ruapc) project.
//!
//! ## Features
//!
//! - **Bump Allocation**: Small requests advance a cursor through equally sized blocks
//! - **Large Allocations**: Requests above the page-derived threshold are tracked
//!   individually and can be freed before the pool is destroyed
//! - **Cleanup Callbacks**: Handlers registered with the pool run once at destruction
//! - **Custom Allocators**: Pluggable allocator trait for the memory backend
//! - **Shared Access**: An optional mutex-protected handle for multi-threaded and async use
//!
//! ## Example
//!
//! ```rust
//! use ruapc_mempool::Pool;
//!
//! # fn main() -> ruapc_mempool::Result<()> {
//! let mut pool = Pool::new(16 * 1024)?;
//!
//! // Small allocations come from the pool's blocks
//! let small = pool.allocate(1024)?;
//! assert!(pool.owns(small));
//!
//! // Large allocations can be released early
//! let large = pool.allocate(64 * 1024)?;
//! assert!(pool.free_large(large));
//!
//! // Small allocations are only released with the pool
//! assert!(!pool.free_large(small));
//! pool.destroy();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]

mod allocator;
mod block;
mod buffer;
mod chain;
mod cleanup;
pub mod config;
mod error;
mod intrusive_list;
mod large;
mod pool;
mod shared;

pub use allocator::{Allocator, DefaultAllocator};
pub use buffer::{HeapBuffer, allocate_zeroed};
pub use cleanup::CleanupHandle;
pub use error::{Error, Result};
pub use pool::{Pool, PoolBuilder};
pub use shared::SharedPool;
