//! Running several verification tasks.
//!
//! Each task builds and owns its whole engine (solver factory, analysis,
//! ARG), so tasks share nothing and can run on a rayon pool. Only the
//! [`Summary`] of a task crosses threads.

use log::{debug, info};
use rayon::prelude::*;

use crate::cegar::{CegarStatistics, SafetyResult, UnknownReason, Verdict};

/// Thread-safe digest of a [`SafetyResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub verdict: Verdict,
    pub reason: Option<UnknownReason>,
    pub stats: CegarStatistics,
}

impl<S, A, P> From<&SafetyResult<S, A, P>> for Summary {
    fn from(res: &SafetyResult<S, A, P>) -> Self {
        Self {
            verdict: res.verdict(),
            reason: res.unknown_reason().cloned(),
            stats: res.stats().clone(),
        }
    }
}

pub type Task<T> = Box<dyn FnOnce() -> T + Send>;

/// Run all tasks in parallel on the global pool. Results are in task order.
pub fn verify_all<T: Send>(tasks: Vec<Task<T>>) -> Vec<T> {
    info!("running {} task(s) on {} thread(s)", tasks.len(), rayon::current_num_threads());
    tasks.into_par_iter().map(|task| task()).collect()
}

/// Like [`verify_all`], on a dedicated pool of `num_threads` threads.
pub fn verify_all_with_threads<T: Send>(
    tasks: Vec<Task<T>>,
    num_threads: usize,
) -> Result<Vec<T>, rayon::ThreadPoolBuildError> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build()?;
    Ok(pool.install(|| verify_all(tasks)))
}

/// Run configurations one after the other until one of them is conclusive.
/// Returns the index of that configuration with its summary, or the summary
/// of the last one if none was.
pub fn first_conclusive(configs: Vec<Box<dyn FnOnce() -> Summary>>) -> Option<(usize, Summary)> {
    let mut last = None;
    for (i, config) in configs.into_iter().enumerate() {
        let summary = config();
        if summary.verdict != Verdict::Unknown {
            return Some((i, summary));
        }
        debug!(
            "configuration {} inconclusive: {}",
            i,
            summary.reason.as_ref().map_or_else(String::new, |r| r.to_string())
        );
        last = Some((i, summary));
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::cegar::ResourceKind;

    type Config = Box<dyn FnOnce() -> Summary>;

    fn summary(verdict: Verdict) -> Summary {
        Summary {
            verdict,
            reason: (verdict == Verdict::Unknown).then_some(UnknownReason::Resource(ResourceKind::Iterations)),
            stats: CegarStatistics::default(),
        }
    }

    #[test]
    fn test_verify_all_keeps_order() {
        let tasks: Vec<Task<usize>> = (0..16usize).map(|i| Box::new(move || i * i) as Task<usize>).collect();
        let res = verify_all(tasks);
        assert_eq!(res, (0..16).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_dedicated_pool() {
        let tasks = vec![
            Box::new(|| Verdict::Safe) as Task<Verdict>,
            Box::new(|| Verdict::Unsafe) as Task<Verdict>,
        ];
        let res = verify_all_with_threads(tasks, 2).unwrap();
        assert_eq!(res, vec![Verdict::Safe, Verdict::Unsafe]);
    }

    #[test]
    fn test_first_conclusive() {
        let configs = vec![
            Box::new(|| summary(Verdict::Unknown)) as Config,
            Box::new(|| summary(Verdict::Safe)) as Config,
            Box::new(|| -> Summary { panic!("not reached") }) as Config,
        ];
        let (i, res) = first_conclusive(configs).unwrap();
        assert_eq!(i, 1);
        assert_eq!(res.verdict, Verdict::Safe);

        let configs = vec![Box::new(|| summary(Verdict::Unknown)) as Config];
        let (i, res) = first_conclusive(configs).unwrap();
        assert_eq!(i, 0);
        assert!(res.reason.is_some());
        assert!(first_conclusive(vec![]).is_none());
    }
}
