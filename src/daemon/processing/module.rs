use anyhow::Result;

use super::job::PersistJob;

/// Represents a job processor. This should realistically be able to abstract over different
/// options: local files, a remote server, a database.
pub trait JobProcessor {
    fn process_next(&mut self, job: PersistJob) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
