use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context as TaskContext;
use std::task::Poll;

use tower::BoxError;
use tower::Service;

use warden_core::Context as WardenContext;
use warden_core::SlotChain;

use crate::error::WardenError;
use crate::layer::WardenLayer;

/// Wraps an inner service with `warden-core`'s `entry`/`exit` pair. Admission
/// runs inside [`Service::call`]'s returned future rather than `poll_ready`,
/// since the origin and hot-parameter values it needs come from the request
/// itself (see [`WardenLayer`]'s module doc).
pub struct WardenService<S, Req>
where
    S: Service<Req, Error = BoxError>,
{
    inner: S,
    layer: WardenLayer<Req>,
    chain: Arc<SlotChain>,
    business_error_of: Option<Arc<dyn Fn(&S::Response) -> bool + Send + Sync>>,
}

impl<S, Req> Clone for WardenService<S, Req>
where
    S: Service<Req, Error = BoxError> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            layer: self.layer.clone(),
            chain: self.chain.clone(),
            business_error_of: self.business_error_of.clone(),
        }
    }
}

impl<S, Req> WardenService<S, Req>
where
    S: Service<Req, Error = BoxError>,
{
    pub(crate) fn new(inner: S, layer: WardenLayer<Req>) -> Self {
        let chain = layer.registry.slot_chain_for(&layer.resource);
        Self { inner, layer, chain, business_error_of: None }
    }

    /// Classify an `Ok` response as a traced business failure: it still
    /// reaches the caller unchanged, but is recorded as an exception
    /// against the resource's nodes, the way upstream's `traceEntry` feeds
    /// a business-level failure into `EX_RATIO`/`EX_COUNT` degrade rules
    /// without itself rejecting the call.
    pub fn with_business_error(mut self, f: impl Fn(&S::Response) -> bool + Send + Sync + 'static) -> Self {
        self.business_error_of = Some(Arc::new(f));
        self
    }
}

impl<S, Req> Service<Req> for WardenService<S, Req>
where
    S: Service<Req, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // Standard tower "clone and swap" idiom: `self.inner` keeps the
        // clone `poll_ready` already drove; the fresh clone moved into the
        // future services this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let layer = self.layer.clone();
        let chain = self.chain.clone();
        let business_error_of = self.business_error_of.clone();

        Box::pin(async move {
            let now = layer.time.now_millis();
            let entrance = layer.registry.entrance_node_for(&layer.context_name);
            let origin = (layer.origin_of)(&req);
            let args = (layer.args_of)(&req);
            let sample = (layer.sample_of)();
            let mut ctx = WardenContext::new(layer.context_name.as_ref(), origin, entrance);

            let wait = chain
                .entry(&mut ctx, layer.entry_type, 1, now, &args, sample)
                .map_err(|e| Box::new(WardenError::from(e)) as BoxError)?;

            if let Some(wait) = wait {
                if layer.fail_fast {
                    let _ = chain.exit(&mut ctx, 0, false, now);
                    return Err(Box::new(WardenError::Busy) as BoxError);
                }
                tokio::time::sleep(wait).await;
            }

            let start_ms = layer.time.now_millis();
            let result = inner.call(req).await;
            let rt_ms = layer.time.now_millis().saturating_sub(start_ms);

            let success = match &result {
                Ok(resp) => !business_error_of.as_ref().is_some_and(|is_business_error| is_business_error(resp)),
                Err(_) => false,
            };

            chain
                .exit(&mut ctx, rt_ms, success, layer.time.now_millis())
                .map_err(|e| Box::new(WardenError::from(e)) as BoxError)?;

            result
        })
    }
}
