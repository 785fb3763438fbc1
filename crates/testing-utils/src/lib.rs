//! # fleetprobe testing utils
//!
//! 各 crate 测试共享的内存 mock 与测试数据构造器。
//!
//! ```toml
//! [dev-dependencies]
//! fleetprobe-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
