use anyhow::Result;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::{info, warn};

#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    http_requests: IntCounterVec,
    store_retries: IntCounter,
    marks_created: IntCounter,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("chartd".into()), None)?;

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "API requests by route and status"),
            &["route", "status"],
        )?;
        let store_retries = IntCounter::new(
            "mark_store_retries_total",
            "Mark inserts retried after a transient store failure",
        )?;
        let marks_created = IntCounter::new("marks_created_total", "Marks newly stored")?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(store_retries.clone()))?;
        registry.register(Box::new(marks_created.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            http_requests,
            store_retries,
            marks_created,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_request(&self, route: &str, status: u16) {
        self.http_requests
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    pub fn store_retry_counter(&self) -> IntCounter {
        self.store_retries.clone()
    }

    pub fn marks_created_counter(&self) -> IntCounter {
        self.marks_created.clone()
    }

    /// Text exposition of everything registered.
    pub fn render(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let make_svc = make_service_fn(move |_| {
            let handle = self.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let handle = handle.clone();
                    async move { Ok::<_, hyper::Error>(handle.exposition()) }
                }))
            }
        });

        let server = Server::try_bind(&addr)?.serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }

    fn exposition(&self) -> Response<Body> {
        let mut response = match self.render() {
            Ok(buffer) => Response::new(Body::from(buffer)),
            Err(err) => {
                warn!(error = ?err, "failed to encode metrics");
                let mut response = Response::new(Body::from("metrics encoding failed"));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return response;
            }
        };
        if let Ok(value) = TextEncoder::new()
            .format_type()
            .parse::<hyper::header::HeaderValue>()
        {
            response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
        }
        response
    }
}
