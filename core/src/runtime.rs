use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

/// Environment variable overriding the number of clustering workers.
pub const WORKERS_ENV: &str = "VOLSEG_WORKERS";

/// Environment variable sizing the global rayon pool.
pub const CPU_THREADS_ENV: &str = "VOLSEG_CPU_THREADS";

static THREAD_POOL_INIT: OnceLock<crate::Result<()>> = OnceLock::new();

/// Initialize the global Rayon thread pool used by data-parallel routines
/// (statistic maps, memo warming).
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `VOLSEG_CPU_THREADS` environment variable
/// 3. Rayon default
pub fn init_global_thread_pool(num_threads: Option<usize>) -> crate::Result<()> {
    let res = THREAD_POOL_INIT.get_or_init(|| {
        let configured_threads = match num_threads {
            Some(n) => Some(n),
            None => read_positive_from_env(CPU_THREADS_ENV)?,
        };

        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("volseg-cpu-{}", i));
        if let Some(n) = configured_threads {
            if n == 0 {
                return Err(crate::Error::invalid_parameter(format!(
                    "{} must be >= 1",
                    CPU_THREADS_ENV
                )));
            }
            builder = builder.num_threads(n);
        }

        builder
            .build_global()
            .map_err(|e| crate::Error::invalid_parameter(e.to_string()))
    });
    res.clone()
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

/// Resolve how many expansion workers a clustering run should spawn.
///
/// Priority:
/// 1. explicit `requested` value
/// 2. `VOLSEG_WORKERS` environment variable
/// 3. available parallelism as seen by rayon
pub fn resolve_worker_count(requested: Option<usize>) -> crate::Result<usize> {
    let count = match requested {
        Some(n) => n,
        None => match read_positive_from_env(WORKERS_ENV)? {
            Some(n) => n,
            None => current_cpu_threads(),
        },
    };
    if count == 0 {
        return Err(crate::Error::invalid_parameter("worker count must be >= 1"));
    }
    Ok(count)
}

fn read_positive_from_env(var: &str) -> crate::Result<Option<usize>> {
    let raw = match env::var(var) {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(crate::Error::invalid_parameter(format!(
                "failed to read {var}: {e}"
            )))
        }
    };

    parse_positive(var, &raw).map(Some)
}

fn parse_positive(var: &str, raw: &str) -> crate::Result<usize> {
    let parsed: usize = raw.trim().parse().map_err(|_| {
        crate::Error::invalid_parameter(format!("{var} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(crate::Error::invalid_parameter(format!("{var} must be >= 1")));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_worker_count_wins() {
        assert_eq!(resolve_worker_count(Some(3)).unwrap(), 3);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = resolve_worker_count(Some(0)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_parse_positive() {
        assert_eq!(parse_positive("X", " 8 ").unwrap(), 8);
        assert!(parse_positive("X", "0").is_err());
        assert!(parse_positive("X", "-2").is_err());
        assert!(parse_positive("X", "many").is_err());
    }
}
