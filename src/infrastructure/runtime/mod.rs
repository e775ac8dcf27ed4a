pub mod manual_clock;
pub mod tokio;

pub use self::manual_clock::ManualClock;
pub use self::tokio::{SystemClock, TokioTaskSpawner};
