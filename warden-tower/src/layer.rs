use std::sync::Arc;

use tower::Layer;

use warden_core::EntryType;
use warden_core::Registry;
use warden_core::TimeSource;
use warden_core::param_metric::ParamValue;
use warden_core::slots::system::SystemSample;

use crate::service::WardenService;

type OriginFn<Req> = Arc<dyn Fn(&Req) -> String + Send + Sync>;
type ArgsFn<Req> = Arc<dyn Fn(&Req) -> Vec<ParamValue> + Send + Sync>;
type SampleFn = Arc<dyn Fn() -> SystemSample + Send + Sync>;

/// Guards a resource with `warden-core`'s decision pipeline: flow control,
/// circuit breaking, hot-parameter control and origin authority, all
/// evaluated before the wrapped service's `call` runs.
///
/// Per-request context (the caller's origin, any hot-parameter values) is
/// read from the request itself via [`Self::with_origin`]/[`Self::with_args`],
/// which is why admission runs in [`tower::Service::call`] rather than
/// `poll_ready` — unlike a plain rate limiter, this adapter's admission
/// decision can depend on the request that hasn't arrived yet when
/// `poll_ready` is polled.
pub struct WardenLayer<Req> {
    pub(crate) registry: Arc<Registry>,
    pub(crate) resource: Arc<str>,
    pub(crate) context_name: Arc<str>,
    pub(crate) entry_type: EntryType,
    pub(crate) origin_of: OriginFn<Req>,
    pub(crate) args_of: ArgsFn<Req>,
    pub(crate) sample_of: SampleFn,
    pub(crate) fail_fast: bool,
    pub(crate) time: TimeSource,
}

impl<Req> Clone for WardenLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            resource: self.resource.clone(),
            context_name: self.context_name.clone(),
            entry_type: self.entry_type,
            origin_of: self.origin_of.clone(),
            args_of: self.args_of.clone(),
            sample_of: self.sample_of.clone(),
            fail_fast: self.fail_fast,
            time: self.time.clone(),
        }
    }
}

impl<Req> std::fmt::Debug for WardenLayer<Req> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WardenLayer")
            .field("resource", &self.resource)
            .field("context_name", &self.context_name)
            .field("entry_type", &self.entry_type)
            .field("fail_fast", &self.fail_fast)
            .finish_non_exhaustive()
    }
}

impl<Req> WardenLayer<Req> {
    /// Guard `resource` with `registry`'s rules. Every caller is attributed
    /// to the `"default"` origin and no hot-parameter arguments are
    /// extracted until [`Self::with_origin`]/[`Self::with_args`] are set.
    pub fn new(registry: Arc<Registry>, resource: impl Into<Arc<str>>) -> Self {
        let resource = resource.into();
        Self {
            registry,
            context_name: resource.clone(),
            resource,
            entry_type: EntryType::In,
            origin_of: Arc::new(|_: &Req| "default".to_string()),
            args_of: Arc::new(|_: &Req| Vec::new()),
            sample_of: Arc::new(SystemSample::default),
            fail_fast: false,
            time: TimeSource::new(),
        }
    }

    /// The `Context` name entries are pushed under; defaults to the
    /// resource name. Share one name across several layered resources to
    /// aggregate them under a single `EntranceNode`.
    pub fn with_context_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.context_name = name.into();
        self
    }

    pub fn with_entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = entry_type;
        self
    }

    /// Derive the calling origin (matched against authority rules) from each request.
    pub fn with_origin(mut self, origin_of: impl Fn(&Req) -> String + Send + Sync + 'static) -> Self {
        self.origin_of = Arc::new(origin_of);
        self
    }

    /// Derive the hot-parameter values to check from each request.
    pub fn with_args(mut self, args_of: impl Fn(&Req) -> Vec<ParamValue> + Send + Sync + 'static) -> Self {
        self.args_of = Arc::new(args_of);
        self
    }

    /// Supply the process samples `SystemRule` thresholds are checked
    /// against; this crate does no OS sampling of its own.
    pub fn with_system_sample(mut self, sample_of: impl Fn() -> SystemSample + Send + Sync + 'static) -> Self {
        self.sample_of = Arc::new(sample_of);
        self
    }

    /// Reject immediately instead of cooperatively sleeping when a shaper
    /// admits the call only after a queueing delay.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

impl<Req, S> Layer<S> for WardenLayer<Req>
where
    S: tower::Service<Req, Error = tower::BoxError>,
{
    type Service = WardenService<S, Req>;

    fn layer(&self, inner: S) -> Self::Service {
        WardenService::new(inner, self.clone())
    }
}
