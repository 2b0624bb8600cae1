//! Test helpers shared by the Aiza crates.

pub mod jwt;
pub mod time;

pub use jwt::unsigned_jwt;
pub use time::MockClock;
