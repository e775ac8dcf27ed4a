use crate::domain::ports::clock::Clock;
use crate::domain::ports::task_spawner::TaskSpawner;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

#[derive(Clone, Default)]
pub struct TokioTaskSpawner;

impl TokioTaskSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl TaskSpawner for TokioTaskSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        tokio::spawn(future);
    }
}

#[derive(Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
