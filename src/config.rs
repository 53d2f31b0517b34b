//! Runtime options.
//!
//! There is no configuration file; a `Config` is built in code,
//! optionally starting from a few environment variables (`Config::from_env`).

/// Which collector the heap runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Collector {
    /// Tri-color marking spread across allocations, with an atomic sweep.
    #[default]
    Incremental,
    /// Atomic marking once allocations outpace survivors, then a lazy sweep.
    MarkSweep,
}

/// What `car` and `cdr` of `nil` do.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum NilAccess {
    /// Taking `car`/`cdr` of nil is a type error.
    #[default]
    Strict,
    /// `car`/`cdr` of nil is nil.
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub collector: Collector,
    pub nil_access: NilAccess,
    /// Maximum number of live heap objects; `None` is unbounded.
    pub heap_limit: Option<usize>,
    /// Whether the REPL stops at the first error.
    pub abort_on_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            collector: Collector::default(),
            nil_access: NilAccess::default(),
            heap_limit: None,
            abort_on_error: true,
        }
    }
}

impl Config {
    pub fn with_collector(mut self, collector: Collector) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_nil_access(mut self, nil_access: NilAccess) -> Self {
        self.nil_access = nil_access;
        self
    }

    pub fn with_heap_limit(mut self, limit: Option<usize>) -> Self {
        self.heap_limit = limit;
        self
    }

    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Build a config from the defaults, overridden by environment variables:
    ///
    /// - `BYTELISP_COLLECTOR`: `incremental` or `mark-sweep`
    /// - `BYTELISP_NIL`: `strict` or `lenient`
    /// - `BYTELISP_HEAP_LIMIT`: maximum number of live objects
    /// - `BYTELISP_KEEP_GOING`: if set, the REPL continues after errors
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        if let Some(v) = get("BYTELISP_COLLECTOR") {
            match v.as_str() {
                "incremental" => config.collector = Collector::Incremental,
                "mark-sweep" => config.collector = Collector::MarkSweep,
                other => tracing::warn!("ignoring unknown BYTELISP_COLLECTOR value {other:?}"),
            }
        }
        if let Some(v) = get("BYTELISP_NIL") {
            match v.as_str() {
                "strict" => config.nil_access = NilAccess::Strict,
                "lenient" => config.nil_access = NilAccess::Lenient,
                other => tracing::warn!("ignoring unknown BYTELISP_NIL value {other:?}"),
            }
        }
        if let Some(v) = get("BYTELISP_HEAP_LIMIT") {
            match v.parse::<usize>() {
                Ok(n) => config.heap_limit = Some(n),
                Err(e) => tracing::warn!("ignoring BYTELISP_HEAP_LIMIT {v:?}: {e}"),
            }
        }
        if get("BYTELISP_KEEP_GOING").is_some() {
            config.abort_on_error = false;
        }
        config
    }
}
