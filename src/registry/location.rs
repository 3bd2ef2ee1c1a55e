//! Execution-host location resolution for the log and proxy surfaces.
//!
//! [`LocationResolver`] turns a workload into the network address of the
//! agent running on its assigned host. The log and proxy surfaces share one
//! resolver and differ only in the path they build and in their
//! [`RedirectCapabilities`]: the verbs they forward and whether a protocol
//! upgrade may be requested.

use std::fmt;
use std::net::Ipv6Addr;
use std::sync::Arc;

use http::{header, Method, Request};
use url::Url;

use crate::config::AgentConfig;
use crate::constants::WORKLOAD_RESOURCE;
use crate::domain::WorkloadRecord;
use crate::error::RegistryError;
use crate::registry::accessor::RecordAccessor;
use crate::registry::generic::storage_error;
use crate::store::{StorageBackend, VersionedStore};

/// Verbs and upgrade support of a forwarding surface.
///
/// # Examples
///
/// ```
/// use http::Method;
/// use workload_registry::registry::RedirectCapabilities;
///
/// let log = RedirectCapabilities::log();
/// assert!(log.allows(&Method::GET));
/// assert!(!log.allows(&Method::POST));
/// assert!(!log.supports_upgrade());
///
/// assert!(RedirectCapabilities::proxy().supports_upgrade());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectCapabilities {
    surface: &'static str,
    methods: Vec<Method>,
    upgrade: bool,
}

impl RedirectCapabilities {
    /// Container log streaming: `GET` only, no upgrade.
    pub fn log() -> Self {
        Self {
            surface: "log",
            methods: vec![Method::GET],
            upgrade: false,
        }
    }

    /// Generic proxying: `GET`, `PUT`, `POST`, `DELETE`, `HEAD` and
    /// `OPTIONS`, upgrade allowed.
    pub fn proxy() -> Self {
        Self {
            surface: "proxy",
            methods: vec![
                Method::GET,
                Method::PUT,
                Method::POST,
                Method::DELETE,
                Method::HEAD,
                Method::OPTIONS,
            ],
            upgrade: true,
        }
    }

    /// Name of the surface, used in errors.
    pub fn surface(&self) -> &'static str {
        self.surface
    }

    /// Forwarded verbs.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Returns `true` if `method` is forwarded.
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Whether the surface may request a protocol upgrade.
    pub fn supports_upgrade(&self) -> bool {
        self.upgrade
    }
}

/// Builds requests to an execution host within a surface's capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTransport {
    capabilities: RedirectCapabilities,
}

impl ForwardTransport {
    /// Creates a transport limited to `capabilities`.
    pub fn new(capabilities: RedirectCapabilities) -> Self {
        Self { capabilities }
    }

    /// The capabilities this transport enforces.
    pub fn capabilities(&self) -> &RedirectCapabilities {
        &self.capabilities
    }

    /// Builds a bodiless request for `url`.
    ///
    /// `upgrade` names the protocol to switch to, if any; it is sent as
    /// `Connection: Upgrade` plus `Upgrade: {protocol}`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::MethodNotAllowed`] if the verb is not forwarded
    /// - [`RegistryError::BadRequest`] if an upgrade is requested on a
    ///   surface without upgrade support
    pub fn request(
        &self,
        url: &Url,
        method: Method,
        upgrade: Option<&str>,
    ) -> Result<Request<()>, RegistryError> {
        if !self.capabilities.allows(&method) {
            return Err(RegistryError::MethodNotAllowed {
                method: method.to_string(),
                surface: self.capabilities.surface.to_string(),
            });
        }

        let mut builder = Request::builder().method(method).uri(url.as_str());
        if let Some(protocol) = upgrade {
            if !self.capabilities.upgrade {
                return Err(RegistryError::BadRequest(format!(
                    "the {} surface does not support protocol upgrades",
                    self.capabilities.surface
                )));
            }
            builder = builder
                .header(header::CONNECTION, "Upgrade")
                .header(header::UPGRADE, protocol);
        }

        builder
            .body(())
            .map_err(|e| RegistryError::BadRequest(format!("cannot build forwarded request: {e}")))
    }
}

/// Where and how to reach a workload's execution host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLocation {
    /// The assigned host.
    pub host: String,

    /// Full address of the resource on the host's agent.
    pub url: Url,

    /// Transport limited to the requesting surface's capabilities.
    pub transport: ForwardTransport,
}

impl ExecutionLocation {
    /// Builds a request to [`url`](Self::url). See
    /// [`ForwardTransport::request`].
    pub fn request(&self, method: Method, upgrade: Option<&str>) -> Result<Request<()>, RegistryError> {
        self.transport.request(&self.url, method, upgrade)
    }
}

/// Resolves a workload to the agent address of its assigned host.
pub struct LocationResolver<B: StorageBackend> {
    store: Arc<VersionedStore<B>>,
    accessor: RecordAccessor,
    agent: AgentConfig,
}

impl<B: StorageBackend> Clone for LocationResolver<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            accessor: self.accessor.clone(),
            agent: self.agent.clone(),
        }
    }
}

impl<B: StorageBackend> fmt::Debug for LocationResolver<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationResolver")
            .field("accessor", &self.accessor)
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> LocationResolver<B> {
    /// Creates a resolver reaching agents as described by `agent`.
    pub fn new(store: Arc<VersionedStore<B>>, accessor: RecordAccessor, agent: AgentConfig) -> Self {
        Self {
            store,
            accessor,
            agent,
        }
    }

    /// Reads the workload and checks it has a host.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if the workload does not exist or its
    ///   key cannot be derived
    /// - [`RegistryError::Unassigned`] if it has no host yet
    pub async fn assigned_record(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadRecord, RegistryError> {
        let key = self
            .accessor
            .record_key(namespace, name)
            .map_err(|_| RegistryError::not_found(WORKLOAD_RESOURCE, name))?;
        let (mut record, version): (WorkloadRecord, u64) = self
            .store
            .get(&key)
            .await
            .map_err(|e| storage_error(WORKLOAD_RESOURCE, name, e))?;
        record.metadata.version = version;

        if record.assigned_host().is_none() {
            return Err(RegistryError::Unassigned {
                name: name.to_string(),
            });
        }
        Ok(record)
    }

    /// Root address of the agent on `host`. IPv6 literals are bracketed.
    pub fn agent_url(&self, host: &str) -> Result<Url, RegistryError> {
        let authority = if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let raw = format!("{}://{}:{}/", self.agent.scheme, authority, self.agent.port);
        Url::parse(&raw).map_err(|e| {
            RegistryError::Internal(format!("execution host {host:?} is not addressable: {e}"))
        })
    }

    /// Resolves the workload to its agent's root address.
    pub async fn resolve(
        &self,
        namespace: &str,
        name: &str,
        capabilities: RedirectCapabilities,
    ) -> Result<ExecutionLocation, RegistryError> {
        let record = self.assigned_record(namespace, name).await?;
        self.locate(&record, capabilities)
    }

    fn locate(
        &self,
        record: &WorkloadRecord,
        capabilities: RedirectCapabilities,
    ) -> Result<ExecutionLocation, RegistryError> {
        let host = record.spec.host.clone();
        let url = self.agent_url(&host)?;
        tracing::debug!(
            name = record.name(),
            host = host.as_str(),
            url = url.as_str(),
            surface = capabilities.surface(),
            "resolved execution location"
        );
        Ok(ExecutionLocation {
            host,
            url,
            transport: ForwardTransport::new(capabilities),
        })
    }
}

/// Options of a log request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Container to read. May be omitted for single-container workloads.
    pub container: Option<String>,

    /// Keep the stream open.
    pub follow: bool,

    /// Only the last N lines.
    pub tail_lines: Option<u64>,
}

impl LogOptions {
    /// Selects a container.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Requests a following stream.
    pub fn follow(mut self) -> Self {
        self.follow = true;
        self
    }

    /// Limits output to the last `lines` lines.
    pub fn with_tail_lines(mut self, lines: u64) -> Self {
        self.tail_lines = Some(lines);
        self
    }
}

fn select_container<'a>(record: &'a WorkloadRecord, requested: Option<&str>) -> Result<&'a str, RegistryError> {
    match requested.filter(|name| !name.is_empty()) {
        Some(name) => record.container(name).map(|c| c.name.as_str()).ok_or_else(|| {
            RegistryError::BadRequest(format!(
                "container {name} is not valid for workload {}",
                record.name()
            ))
        }),
        None => match record.spec.containers.as_slice() {
            [only] => Ok(only.name.as_str()),
            _ => Err(RegistryError::BadRequest(format!(
                "a container name must be specified for workload {}",
                record.name()
            ))),
        },
    }
}

/// Resolves container log streams. `GET` only, no upgrade.
#[derive(Debug)]
pub struct LogSurface<B: StorageBackend> {
    resolver: LocationResolver<B>,
}

impl<B: StorageBackend> LogSurface<B> {
    /// Creates the surface over `resolver`.
    pub fn new(resolver: LocationResolver<B>) -> Self {
        Self { resolver }
    }

    /// Forwarded verbs.
    pub fn methods(&self) -> Vec<Method> {
        RedirectCapabilities::log().methods().to_vec()
    }

    /// Always `false`.
    pub fn supports_upgrade(&self) -> bool {
        RedirectCapabilities::log().supports_upgrade()
    }

    /// Address of `/containerLogs/{namespace}/{name}/{container}` on the
    /// workload's host.
    ///
    /// # Errors
    ///
    /// Those of [`LocationResolver::assigned_record`], plus
    /// [`RegistryError::BadRequest`] if the container is unknown, or
    /// omitted for a workload with several containers.
    pub async fn resolve_location(
        &self,
        namespace: &str,
        name: &str,
        options: &LogOptions,
    ) -> Result<ExecutionLocation, RegistryError> {
        let record = self.resolver.assigned_record(namespace, name).await?;
        let container = select_container(&record, options.container.as_deref())?;
        let mut location = self.resolver.locate(&record, RedirectCapabilities::log())?;

        location
            .url
            .path_segments_mut()
            .map_err(|()| RegistryError::Internal("agent address cannot carry a path".to_string()))?
            .clear()
            .extend(["containerLogs", namespace, name, container]);

        if options.follow || options.tail_lines.is_some() {
            let mut query = location.url.query_pairs_mut();
            if options.follow {
                query.append_pair("follow", "true");
            }
            if let Some(lines) = options.tail_lines {
                query.append_pair("tailLines", &lines.to_string());
            }
        }
        Ok(location)
    }
}

/// Resolves arbitrary paths on the workload's host for proxying.
#[derive(Debug)]
pub struct ProxySurface<B: StorageBackend> {
    resolver: LocationResolver<B>,
}

impl<B: StorageBackend> ProxySurface<B> {
    /// Creates the surface over `resolver`.
    pub fn new(resolver: LocationResolver<B>) -> Self {
        Self { resolver }
    }

    /// Forwarded verbs.
    pub fn methods(&self) -> Vec<Method> {
        RedirectCapabilities::proxy().methods().to_vec()
    }

    /// Always `true`.
    pub fn supports_upgrade(&self) -> bool {
        RedirectCapabilities::proxy().supports_upgrade()
    }

    /// Address of `path` on the workload's host.
    ///
    /// A query string in `path` becomes the query of the address and a
    /// fragment is dropped. Dot segments are resolved, so the path never
    /// climbs above the agent root.
    pub async fn resolve_location(
        &self,
        namespace: &str,
        name: &str,
        path: &str,
    ) -> Result<ExecutionLocation, RegistryError> {
        let mut location = self
            .resolver
            .resolve(namespace, name, RedirectCapabilities::proxy())
            .await?;

        let path = path.split_once('#').map_or(path, |(before, _)| before);
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        if path.starts_with('/') {
            location.url.set_path(path);
        } else {
            location.url.set_path(&format!("/{path}"));
        }
        location.url.set_query(query.filter(|q| !q.is_empty()));
        Ok(location)
    }
}
