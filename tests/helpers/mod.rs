#![allow(dead_code)]
#![allow(unused_imports)]
pub mod engine;
pub mod seed;
pub mod test_db;

pub use engine::*;
pub use seed::*;
pub use test_db::*;
